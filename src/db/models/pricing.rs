//! Fare configuration, admin-editable and cached in-process.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Fallback values used when no settings row exists
pub const DEFAULT_RATE_PER_MILE: f64 = 1.5;
pub const DEFAULT_RATE_PER_MINUTE: f64 = 0.3;
pub const DEFAULT_MINIMUM_FARE: f64 = 5.0;
pub const DEFAULT_PLATFORM_FEE_PERCENT: f64 = 20.0;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricingSettings {
    pub id: String,
    pub base_rate_per_mile: f64,
    pub base_rate_per_minute: f64,
    pub minimum_fare: f64,
    pub platform_fee_percent: f64,
    pub updated_by: Option<String>,
    pub updated_at: String,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            base_rate_per_mile: DEFAULT_RATE_PER_MILE,
            base_rate_per_minute: DEFAULT_RATE_PER_MINUTE,
            minimum_fare: DEFAULT_MINIMUM_FARE,
            platform_fee_percent: DEFAULT_PLATFORM_FEE_PERCENT,
            updated_by: None,
            updated_at: String::new(),
        }
    }
}

impl PricingSettings {
    /// Load the settings row, falling back to literal defaults when absent
    pub async fn load(pool: &SqlitePool) -> Result<PricingSettings, sqlx::Error> {
        let settings: Option<PricingSettings> =
            sqlx::query_as("SELECT * FROM pricing_settings WHERE id = 'default'")
                .fetch_optional(pool)
                .await?;
        Ok(settings.unwrap_or_default())
    }

    pub async fn update(
        pool: &SqlitePool,
        req: &UpdatePricingRequest,
        updated_by: &str,
    ) -> Result<PricingSettings, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO pricing_settings \
             (id, base_rate_per_mile, base_rate_per_minute, minimum_fare, platform_fee_percent, updated_by, updated_at) \
             VALUES ('default', ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             base_rate_per_mile = excluded.base_rate_per_mile, \
             base_rate_per_minute = excluded.base_rate_per_minute, \
             minimum_fare = excluded.minimum_fare, \
             platform_fee_percent = excluded.platform_fee_percent, \
             updated_by = excluded.updated_by, \
             updated_at = excluded.updated_at",
        )
        .bind(req.base_rate_per_mile)
        .bind(req.base_rate_per_minute)
        .bind(req.minimum_fare)
        .bind(req.platform_fee_percent)
        .bind(updated_by)
        .bind(&now)
        .execute(pool)
        .await?;

        Self::load(pool).await
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricingRequest {
    pub base_rate_per_mile: f64,
    pub base_rate_per_minute: f64,
    pub minimum_fare: f64,
    pub platform_fee_percent: f64,
}
