//! Driver offers on unassigned rides.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::user::UserResponse;

/// Whether the driver accepted the proposed fare or countered with their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferKind {
    Accept,
    Counter,
}

impl OfferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferKind::Accept => "accept",
            OfferKind::Counter => "counter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "accept" => Some(OfferKind::Accept),
            "counter" => Some(OfferKind::Counter),
            _ => None,
        }
    }
}

impl std::fmt::Display for OfferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Selected,
    Rejected,
    Withdrawn,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Selected => "selected",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(OfferStatus::Pending),
            "selected" => Some(OfferStatus::Selected),
            "rejected" => Some(OfferStatus::Rejected),
            "withdrawn" => Some(OfferStatus::Withdrawn),
            _ => None,
        }
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RideOffer {
    pub id: String,
    pub ride_id: String,
    pub driver_id: String,
    pub kind: String,
    pub amount: f64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RideOffer {
    pub fn get_kind(&self) -> OfferKind {
        OfferKind::from_str(&self.kind).unwrap_or(OfferKind::Accept)
    }

    pub fn get_status(&self) -> OfferStatus {
        OfferStatus::from_str(&self.status).unwrap_or(OfferStatus::Pending)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<RideOffer>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ride_offers WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Live (pending) offers on a ride, oldest first
    pub async fn live_for_ride(
        pool: &SqlitePool,
        ride_id: &str,
    ) -> Result<Vec<RideOffer>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM ride_offers WHERE ride_id = ? AND status = 'pending' ORDER BY created_at ASC",
        )
        .bind(ride_id)
        .fetch_all(pool)
        .await
    }

    /// Withdraw a driver's live offer on a ride, if any. Returns the number
    /// of offers withdrawn.
    pub async fn withdraw_live_for_driver(
        pool: &SqlitePool,
        ride_id: &str,
        driver_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ride_offers SET status = 'withdrawn', updated_at = ? \
             WHERE ride_id = ? AND driver_id = ? AND status = 'pending'",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(ride_id)
        .bind(driver_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark one offer selected and reject every other live offer on the ride
    pub async fn resolve_selection(
        pool: &SqlitePool,
        ride_id: &str,
        selected_offer_id: &str,
    ) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE ride_offers SET status = 'selected', updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(selected_offer_id)
            .execute(pool)
            .await?;
        sqlx::query(
            "UPDATE ride_offers SET status = 'rejected', updated_at = ? \
             WHERE ride_id = ? AND id != ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(ride_id)
        .bind(selected_offer_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct MakeOfferRequest {
    pub kind: OfferKind,
    /// Required for counter-offers; ignored for plain accepts
    pub amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DeclineRideRequest {
    pub reason: String,
}

/// Offer with the offering driver joined in
#[derive(Debug, Clone, Serialize)]
pub struct OfferResponse {
    #[serde(flatten)]
    pub offer: RideOffer,
    pub driver: Option<UserResponse>,
}
