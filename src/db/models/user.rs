//! User and session models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Account roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Passenger,
    Driver,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Passenger => "passenger",
            UserRole::Driver => "driver",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "passenger" => Some(UserRole::Passenger),
            "driver" => Some(UserRole::Driver),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account status. KYC approval moves a passenger to `active` and a driver
/// to `verified`; only verified drivers can come online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
    Verified,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Active => "active",
            UserStatus::Verified => "verified",
            UserStatus::Suspended => "suspended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(UserStatus::Pending),
            "active" => Some(UserStatus::Active),
            "verified" => Some(UserStatus::Verified),
            "suspended" => Some(UserStatus::Suspended),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: String,
    pub status: String,
    pub online: i64,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub located_at: Option<String>,
    pub rating_average: f64,
    pub rating_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn get_role(&self) -> UserRole {
        UserRole::from_str(&self.role).unwrap_or(UserRole::Passenger)
    }

    pub fn get_status(&self) -> UserStatus {
        UserStatus::from_str(&self.status).unwrap_or(UserStatus::Pending)
    }

    pub fn is_admin(&self) -> bool {
        self.get_role() == UserRole::Admin
    }

    /// Whether this driver may appear in nearby listings and offer on rides
    pub fn is_active_driver(&self) -> bool {
        self.get_role() == UserRole::Driver && self.get_status() == UserStatus::Verified
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(
        pool: &SqlitePool,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Record a location fix and flip the online flag
    pub async fn update_location(
        pool: &SqlitePool,
        id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE users SET last_latitude = ?, last_longitude = ?, located_at = ?, online = 1, updated_at = ? WHERE id = ?",
        )
        .bind(latitude)
        .bind(longitude)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_online(pool: &SqlitePool, id: &str, online: bool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET online = ?, updated_at = ? WHERE id = ?")
            .bind(if online { 1 } else { 0 })
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_status(
        pool: &SqlitePool,
        id: &str,
        status: UserStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// All online, verified drivers with a known position
    pub async fn online_drivers(pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM users WHERE role = 'driver' AND status = 'verified' AND online = 1 \
             AND last_latitude IS NOT NULL AND last_longitude IS NOT NULL",
        )
        .fetch_all(pool)
        .await
    }
}

/// Public projection of a user, safe to embed in ride payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: String,
    pub status: String,
    pub online: bool,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub located_at: Option<String>,
    pub rating_average: f64,
    pub rating_count: i64,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            phone: user.phone,
            role: user.role,
            status: user.status,
            online: user.online != 0,
            last_latitude: user.last_latitude,
            last_longitude: user.last_longitude,
            located_at: user.located_at,
            rating_average: user.rating_average,
            rating_count: user.rating_count,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct LocationUpdateRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [UserRole::Passenger, UserRole::Driver, UserRole::Admin] {
            assert_eq!(UserRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::from_str("dispatcher"), None);
    }

    #[test]
    fn test_active_driver_requires_verified() {
        let mut user = User {
            id: "u1".into(),
            email: "d@example.com".into(),
            password_hash: String::new(),
            name: "Dana".into(),
            phone: None,
            role: "driver".into(),
            status: "pending".into(),
            online: 1,
            last_latitude: None,
            last_longitude: None,
            located_at: None,
            rating_average: 0.0,
            rating_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(!user.is_active_driver());
        user.status = "verified".into();
        assert!(user.is_active_driver());
        user.role = "passenger".into();
        assert!(!user.is_active_driver());
    }
}
