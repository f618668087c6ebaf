//! KYC document bundles gating account activation.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Pending => "pending",
            KycStatus::Approved => "approved",
            KycStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(KycStatus::Pending),
            "approved" => Some(KycStatus::Approved),
            "rejected" => Some(KycStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for KycStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KycRecord {
    pub id: String,
    pub user_id: String,
    pub document_type: String,
    pub document_number: String,
    pub document_url: Option<String>,
    pub selfie_url: Option<String>,
    pub driver_license_number: Option<String>,
    pub driver_license_url: Option<String>,
    pub payment_method: Option<String>,
    pub payment_account: Option<String>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl KycRecord {
    pub fn get_status(&self) -> KycStatus {
        KycStatus::from_str(&self.status).unwrap_or(KycStatus::Pending)
    }

    pub async fn find_by_user(
        pool: &SqlitePool,
        user_id: &str,
    ) -> Result<Option<KycRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM kyc_records WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<KycRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM kyc_records WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_status(
        pool: &SqlitePool,
        status: KycStatus,
    ) -> Result<Vec<KycRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM kyc_records WHERE status = ? ORDER BY created_at ASC")
            .bind(status.as_str())
            .fetch_all(pool)
            .await
    }

    /// Record a review decision
    pub async fn review(
        pool: &SqlitePool,
        id: &str,
        status: KycStatus,
        rejection_reason: Option<&str>,
        reviewer_id: &str,
    ) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE kyc_records SET status = ?, rejection_reason = ?, reviewed_by = ?, \
             reviewed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(rejection_reason)
        .bind(reviewer_id)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitKycRequest {
    pub document_type: String,
    pub document_number: String,
    pub document_url: Option<String>,
    pub selfie_url: Option<String>,
    pub driver_license_number: Option<String>,
    pub driver_license_url: Option<String>,
    pub payment_method: Option<String>,
    pub payment_account: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewKycRequest {
    pub approve: bool,
    pub rejection_reason: Option<String>,
}
