//! User-facing notifications.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OfferMade,
    DriverAssigned,
    DriverArrived,
    RideStarted,
    RideCompleted,
    RideCancelled,
    KycApproved,
    KycRejected,
    NewMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OfferMade => "offer_made",
            NotificationKind::DriverAssigned => "driver_assigned",
            NotificationKind::DriverArrived => "driver_arrived",
            NotificationKind::RideStarted => "ride_started",
            NotificationKind::RideCompleted => "ride_completed",
            NotificationKind::RideCancelled => "ride_cancelled",
            NotificationKind::KycApproved => "kyc_approved",
            NotificationKind::KycRejected => "kyc_rejected",
            NotificationKind::NewMessage => "new_message",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub ride_id: Option<String>,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub is_read: i64,
    pub created_at: String,
}

impl Notification {
    pub async fn create(
        pool: &SqlitePool,
        user_id: &str,
        ride_id: Option<&str>,
        kind: NotificationKind,
        title: &str,
        body: &str,
    ) -> Result<Notification, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO notifications (id, user_id, ride_id, kind, title, body, is_read, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(ride_id)
        .bind(kind.as_str())
        .bind(title)
        .bind(body)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(Notification {
            id,
            user_id: user_id.to_string(),
            ride_id: ride_id.map(|s| s.to_string()),
            kind: kind.as_str().to_string(),
            title: title.to_string(),
            body: body.to_string(),
            is_read: 0,
            created_at: now,
        })
    }

    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn unread_count(pool: &SqlitePool, user_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Mark one notification read. Scoped to the owner so users cannot
    /// touch each other's rows.
    pub async fn mark_read(
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_all_read(pool: &SqlitePool, user_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
