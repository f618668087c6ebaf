//! Append-only per-ride event log.
//!
//! Each ride's events carry a per-ride monotonic `seq`; subscribers replay
//! the persisted backlog from a cursor and then follow the live broadcast
//! (see `events::RideEventBus`). Ordering within a ride is total.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideEventType {
    RideCreated,
    OfferMade,
    OfferWithdrawn,
    DriverAssigned,
    DriverArrived,
    RideStarted,
    RideCompleted,
    RideCancelled,
    LocationUpdated,
    MessageSent,
}

impl RideEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideEventType::RideCreated => "ride_created",
            RideEventType::OfferMade => "offer_made",
            RideEventType::OfferWithdrawn => "offer_withdrawn",
            RideEventType::DriverAssigned => "driver_assigned",
            RideEventType::DriverArrived => "driver_arrived",
            RideEventType::RideStarted => "ride_started",
            RideEventType::RideCompleted => "ride_completed",
            RideEventType::RideCancelled => "ride_cancelled",
            RideEventType::LocationUpdated => "location_updated",
            RideEventType::MessageSent => "message_sent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ride_created" => Some(RideEventType::RideCreated),
            "offer_made" => Some(RideEventType::OfferMade),
            "offer_withdrawn" => Some(RideEventType::OfferWithdrawn),
            "driver_assigned" => Some(RideEventType::DriverAssigned),
            "driver_arrived" => Some(RideEventType::DriverArrived),
            "ride_started" => Some(RideEventType::RideStarted),
            "ride_completed" => Some(RideEventType::RideCompleted),
            "ride_cancelled" => Some(RideEventType::RideCancelled),
            "location_updated" => Some(RideEventType::LocationUpdated),
            "message_sent" => Some(RideEventType::MessageSent),
            _ => None,
        }
    }

    /// Events after which a ride's stream ends
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideEventType::RideCompleted | RideEventType::RideCancelled)
    }
}

impl std::fmt::Display for RideEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RideEvent {
    pub id: i64,
    pub ride_id: String,
    pub seq: i64,
    pub event_type: String,
    pub payload: String,
    pub created_at: String,
}

impl RideEvent {
    pub fn get_event_type(&self) -> Option<RideEventType> {
        RideEventType::from_str(&self.event_type)
    }

    /// Append an event, allocating the next per-ride sequence number.
    ///
    /// The seq allocation and insert run in one transaction so two writers
    /// cannot claim the same number.
    pub async fn append(
        pool: &SqlitePool,
        ride_id: &str,
        event_type: RideEventType,
        payload: serde_json::Value,
    ) -> Result<RideEvent, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let payload_json = payload.to_string();

        let mut tx = pool.begin().await?;

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM ride_events WHERE ride_id = ?",
        )
        .bind(ride_id)
        .fetch_one(&mut *tx)
        .await?;

        let result = sqlx::query(
            "INSERT INTO ride_events (ride_id, seq, event_type, payload, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(ride_id)
        .bind(next_seq)
        .bind(event_type.as_str())
        .bind(&payload_json)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RideEvent {
            id: result.last_insert_rowid(),
            ride_id: ride_id.to_string(),
            seq: next_seq,
            event_type: event_type.as_str().to_string(),
            payload: payload_json,
            created_at: now,
        })
    }

    /// Persisted events with `seq > after`, in order
    pub async fn list_after(
        pool: &SqlitePool,
        ride_id: &str,
        after: i64,
    ) -> Result<Vec<RideEvent>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM ride_events WHERE ride_id = ? AND seq > ? ORDER BY seq ASC",
        )
        .bind(ride_id)
        .bind(after)
        .fetch_all(pool)
        .await
    }
}
