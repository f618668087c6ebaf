//! Fare configuration endpoints.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::db::{PricingSettings, UpdatePricingRequest, User};
use crate::AppState;

use super::auth::require_admin;
use super::error::ApiError;
use super::validation::validate_positive_amount;

/// Current fare configuration
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    _user: User,
) -> Json<PricingSettings> {
    Json(state.pricing.load().as_ref().clone())
}

/// Replace the fare configuration. Takes effect immediately for quotes
/// and new rides; in-flight rides keep their agreed fares. Admin only.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<UpdatePricingRequest>,
) -> Result<Json<PricingSettings>, ApiError> {
    require_admin(&user)?;

    if let Err(e) = validate_positive_amount(req.base_rate_per_mile, "base_rate_per_mile") {
        return Err(ApiError::validation_field("base_rate_per_mile", e));
    }
    if let Err(e) = validate_positive_amount(req.base_rate_per_minute, "base_rate_per_minute") {
        return Err(ApiError::validation_field("base_rate_per_minute", e));
    }
    if let Err(e) = validate_positive_amount(req.minimum_fare, "minimum_fare") {
        return Err(ApiError::validation_field("minimum_fare", e));
    }
    if !req.platform_fee_percent.is_finite()
        || !(0.0..=100.0).contains(&req.platform_fee_percent)
    {
        return Err(ApiError::validation_field(
            "platform_fee_percent",
            "Fee percent must be between 0 and 100",
        ));
    }

    let settings = PricingSettings::update(&state.db, &req, &user.id).await?;
    state.pricing.store(Arc::new(settings.clone()));

    tracing::info!(updated_by = %user.id, "Updated pricing settings");

    Ok(Json(settings))
}
