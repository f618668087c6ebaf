//! Driver vehicle registrations.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vehicle {
    pub id: String,
    pub driver_id: String,
    pub make: String,
    pub model: String,
    pub year: i64,
    pub color: String,
    pub plate_number: String,
    pub capacity: i64,
    pub registration_url: Option<String>,
    pub insurance_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Vehicle {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Vehicle>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM vehicles WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_driver(
        pool: &SqlitePool,
        driver_id: &str,
    ) -> Result<Vec<Vehicle>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM vehicles WHERE driver_id = ? ORDER BY created_at DESC")
            .bind(driver_id)
            .fetch_all(pool)
            .await
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM vehicles WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateVehicleRequest {
    pub make: String,
    pub model: String,
    pub year: i64,
    pub color: String,
    pub plate_number: String,
    #[serde(default = "default_capacity")]
    pub capacity: i64,
    pub registration_url: Option<String>,
    pub insurance_url: Option<String>,
}

fn default_capacity() -> i64 {
    4
}

#[derive(Debug, Deserialize)]
pub struct UpdateVehicleRequest {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i64>,
    pub color: Option<String>,
    pub plate_number: Option<String>,
    pub capacity: Option<i64>,
    pub registration_url: Option<String>,
    pub insurance_url: Option<String>,
}
