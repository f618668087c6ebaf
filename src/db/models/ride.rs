//! Ride model and the ride status state machine.
//!
//! The server owns the ride lifecycle. Every ride carries a monotonic
//! `version` counter; transitions are applied with a compare-and-swap on
//! `(id, version)` so concurrent writers cannot silently overwrite each
//! other (see `dispatch::lifecycle`).

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::user::UserResponse;

/// Ride lifecycle states.
///
/// `pending → accepted → driver_assigned → driver_arrived → in_progress →
/// completed | cancelled`. `cancelled` is reachable from every non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Accepted,
    DriverAssigned,
    DriverArrived,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Accepted => "accepted",
            RideStatus::DriverAssigned => "driver_assigned",
            RideStatus::DriverArrived => "driver_arrived",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(RideStatus::Pending),
            "accepted" => Some(RideStatus::Accepted),
            "driver_assigned" => Some(RideStatus::DriverAssigned),
            "driver_arrived" => Some(RideStatus::DriverArrived),
            "in_progress" => Some(RideStatus::InProgress),
            "completed" => Some(RideStatus::Completed),
            "cancelled" => Some(RideStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    /// Whether the ride is still on the offer board
    pub fn is_unassigned(&self) -> bool {
        matches!(self, RideStatus::Pending | RideStatus::Accepted)
    }

    /// Allowed forward transitions
    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        use RideStatus::*;
        match (self, next) {
            (Pending, Accepted) => true,
            (Pending, DriverAssigned) => true, // direct select of a lone offer
            (Accepted, DriverAssigned) => true,
            (DriverAssigned, DriverArrived) => true,
            (DriverArrived, InProgress) => true,
            (InProgress, Completed) => true,
            (current, Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immediate or scheduled pickup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideType {
    Now,
    Scheduled,
}

impl RideType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideType::Now => "now",
            RideType::Scheduled => "scheduled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "now" => Some(RideType::Now),
            "scheduled" => Some(RideType::Scheduled),
            _ => None,
        }
    }
}

impl std::fmt::Display for RideType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ride {
    pub id: String,
    pub passenger_id: String,
    pub driver_id: Option<String>,
    pub pickup_address: String,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub destination_address: String,
    pub destination_latitude: Option<f64>,
    pub destination_longitude: Option<f64>,
    pub passengers: i64,
    pub ride_type: String,
    pub scheduled_at: Option<String>,
    pub distance_miles: Option<f64>,
    pub duration_minutes: Option<f64>,
    pub proposed_fare: f64,
    pub accepted_fare: Option<f64>,
    pub final_fare: Option<f64>,
    pub status: String,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub version: i64,
    pub client_request_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Ride {
    pub fn get_status(&self) -> RideStatus {
        RideStatus::from_str(&self.status).unwrap_or(RideStatus::Pending)
    }

    pub fn get_ride_type(&self) -> RideType {
        RideType::from_str(&self.ride_type).unwrap_or(RideType::Now)
    }

    /// Whether a user is party to this ride (passenger or assigned driver)
    pub fn involves(&self, user_id: &str) -> bool {
        self.passenger_id == user_id || self.driver_id.as_deref() == Some(user_id)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Ride>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM rides WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Look up a ride by its idempotency key
    pub async fn find_by_request_id(
        pool: &SqlitePool,
        passenger_id: &str,
        client_request_id: &str,
    ) -> Result<Option<Ride>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM rides WHERE passenger_id = ? AND client_request_id = ?")
            .bind(passenger_id)
            .bind(client_request_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_passenger(
        pool: &SqlitePool,
        passenger_id: &str,
    ) -> Result<Vec<Ride>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM rides WHERE passenger_id = ? ORDER BY created_at DESC")
            .bind(passenger_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_for_driver(
        pool: &SqlitePool,
        driver_id: &str,
    ) -> Result<Vec<Ride>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM rides WHERE driver_id = ? ORDER BY created_at DESC")
            .bind(driver_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_all(pool: &SqlitePool, limit: i64) -> Result<Vec<Ride>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM rides ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Rides a driver may still offer on, excluding those they declined
    pub async fn unassigned_for_driver(
        pool: &SqlitePool,
        driver_id: &str,
    ) -> Result<Vec<Ride>, sqlx::Error> {
        sqlx::query_as(
            "SELECT r.* FROM rides r \
             WHERE r.status IN ('pending', 'accepted') \
             AND NOT EXISTS (SELECT 1 FROM ride_declines d WHERE d.ride_id = r.id AND d.driver_id = ?)",
        )
        .bind(driver_id)
        .fetch_all(pool)
        .await
    }

    /// The ride a user is currently in, if any
    pub async fn active_for_user(
        pool: &SqlitePool,
        user_id: &str,
    ) -> Result<Option<Ride>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM rides \
             WHERE (passenger_id = ? OR driver_id = ?) \
             AND status IN ('driver_assigned', 'driver_arrived', 'in_progress') \
             ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Unassigned rides whose negotiation deadline has passed. The deadline
    /// anchor is `scheduled_at` for scheduled rides, `created_at` otherwise.
    pub async fn expired_unassigned(
        pool: &SqlitePool,
        cutoff_rfc3339: &str,
    ) -> Result<Vec<Ride>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM rides \
             WHERE status IN ('pending', 'accepted') \
             AND COALESCE(scheduled_at, created_at) < ?",
        )
        .bind(cutoff_rfc3339)
        .fetch_all(pool)
        .await
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRideRequest {
    pub pickup_address: String,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub destination_address: String,
    pub destination_latitude: Option<f64>,
    pub destination_longitude: Option<f64>,
    #[serde(default = "default_passengers")]
    pub passengers: i64,
    #[serde(default = "default_ride_type")]
    pub ride_type: RideType,
    pub scheduled_at: Option<String>,
    pub distance_miles: Option<f64>,
    pub duration_minutes: Option<f64>,
    pub proposed_fare: f64,
    /// Idempotency key; re-submitting the same key returns the original ride
    pub client_request_id: Option<String>,
}

fn default_passengers() -> i64 {
    1
}

fn default_ride_type() -> RideType {
    RideType::Now
}

#[derive(Debug, Deserialize)]
pub struct CancelRideRequest {
    pub reason: String,
}

/// Ride with passenger/driver snapshots joined at read time
#[derive(Debug, Clone, Serialize)]
pub struct RideResponse {
    #[serde(flatten)]
    pub ride: Ride,
    pub passenger: Option<UserResponse>,
    pub driver: Option<UserResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RideStatus::Pending,
            RideStatus::Accepted,
            RideStatus::DriverAssigned,
            RideStatus::DriverArrived,
            RideStatus::InProgress,
            RideStatus::Completed,
            RideStatus::Cancelled,
        ] {
            assert_eq!(RideStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(RideStatus::from_str("requested"), None);
    }

    #[test]
    fn test_forward_transitions() {
        use RideStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(DriverAssigned));
        assert!(DriverAssigned.can_transition_to(DriverArrived));
        assert!(DriverArrived.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn test_no_skipping_states() {
        use RideStatus::*;
        assert!(!Pending.can_transition_to(DriverArrived));
        assert!(!Pending.can_transition_to(InProgress));
        assert!(!Accepted.can_transition_to(InProgress));
        assert!(!DriverAssigned.can_transition_to(Completed));
        assert!(!DriverArrived.can_transition_to(Completed));
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        use RideStatus::*;
        for status in [Pending, Accepted, DriverAssigned, DriverArrived, InProgress] {
            assert!(status.can_transition_to(Cancelled), "{status} should cancel");
        }
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_terminal_states_are_dead_ends() {
        use RideStatus::*;
        for next in [
            Pending,
            Accepted,
            DriverAssigned,
            DriverArrived,
            InProgress,
            Completed,
        ] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
    }
}
