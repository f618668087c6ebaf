//! Per-ride chat messages between passenger and driver.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: String,
    pub ride_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub is_read: i64,
    pub created_at: String,
}

impl Message {
    pub async fn create(
        pool: &SqlitePool,
        ride_id: &str,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
    ) -> Result<Message, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO messages (id, ride_id, sender_id, recipient_id, body, is_read, created_at) \
             VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(ride_id)
        .bind(sender_id)
        .bind(recipient_id)
        .bind(body)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(Message {
            id,
            ride_id: ride_id.to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            body: body.to_string(),
            is_read: 0,
            created_at: now,
        })
    }

    pub async fn list_for_ride(
        pool: &SqlitePool,
        ride_id: &str,
    ) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM messages WHERE ride_id = ? ORDER BY created_at ASC")
            .bind(ride_id)
            .fetch_all(pool)
            .await
    }

    pub async fn unread_count(
        pool: &SqlitePool,
        ride_id: &str,
        recipient_id: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE ride_id = ? AND recipient_id = ? AND is_read = 0",
        )
        .bind(ride_id)
        .bind(recipient_id)
        .fetch_one(pool)
        .await
    }

    /// Mark everything addressed to the recipient on this ride as read
    pub async fn mark_read(
        pool: &SqlitePool,
        ride_id: &str,
        recipient_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1 WHERE ride_id = ? AND recipient_id = ? AND is_read = 0",
        )
        .bind(ride_id)
        .bind(recipient_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}
