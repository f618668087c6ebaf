//! User management and location endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{LocationUpdateRequest, User, UserResponse, UserStatus};
use crate::dispatch;
use crate::AppState;

use super::auth::require_admin;
use super::error::ApiError;
use super::validation::{validate_latitude, validate_longitude};

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<String>,
    pub status: Option<String>,
}

/// List users, optionally filtered by role and status. Admin only.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    require_admin(&user)?;

    let users: Vec<User> = match (&query.role, &query.status) {
        (Some(role), Some(status)) => {
            sqlx::query_as("SELECT * FROM users WHERE role = ? AND status = ? ORDER BY created_at DESC")
                .bind(role)
                .bind(status)
                .fetch_all(&state.db)
                .await?
        }
        (Some(role), None) => {
            sqlx::query_as("SELECT * FROM users WHERE role = ? ORDER BY created_at DESC")
                .bind(role)
                .fetch_all(&state.db)
                .await?
        }
        (None, Some(status)) => {
            sqlx::query_as("SELECT * FROM users WHERE status = ? ORDER BY created_at DESC")
                .bind(status)
                .fetch_all(&state.db)
                .await?
        }
        (None, None) => {
            sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC")
                .fetch_all(&state.db)
                .await?
        }
    };

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Get a user. Admins can read anyone; everyone else only themselves.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    if user.id != id {
        require_admin(&user)?;
    }
    let target = User::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(target)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: UserStatus,
}

/// Admin suspension/reactivation. Activation through this endpoint is for
/// corrections; the normal path to `active`/`verified` is KYC approval.
pub async fn update_user_status(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    require_admin(&user)?;

    let target = User::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    User::set_status(&state.db, &target.id, req.status).await?;
    if req.status == UserStatus::Suspended {
        // A suspended driver also disappears from nearby listings
        User::set_online(&state.db, &target.id, false).await?;
    }

    tracing::info!(user_id = %id, status = %req.status, "Updated user status");

    let updated = User::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(updated)))
}

/// Record the caller's current position. Drivers use this as their
/// heartbeat; during an active ride the fix is pushed to the ride stream.
pub async fn update_my_location(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<LocationUpdateRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    state
        .lifecycle
        .record_location(&user, req.latitude, req.longitude)
        .await?;

    let updated = User::find_by_id(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(updated)))
}

#[derive(Serialize)]
pub struct OfflineResponse {
    pub ok: bool,
}

/// Explicitly go offline (drivers ending their shift)
pub async fn go_offline(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<OfflineResponse>, ApiError> {
    User::set_online(&state.db, &user.id, false).await?;
    Ok(Json(OfflineResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct NearbyDriverResponse {
    #[serde(flatten)]
    pub driver: UserResponse,
    pub distance_km: f64,
}

/// Online verified drivers near a position, nearest first
pub async fn nearby_drivers(
    State(state): State<Arc<AppState>>,
    _user: User,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyDriverResponse>>, ApiError> {
    if let Err(e) = validate_latitude(query.latitude) {
        return Err(ApiError::validation_field("latitude", e));
    }
    if let Err(e) = validate_longitude(query.longitude) {
        return Err(ApiError::validation_field("longitude", e));
    }

    let drivers = User::online_drivers(&state.db).await?;
    let radius = state.config.dispatch.nearby_driver_radius_km;
    let nearby = dispatch::nearby_drivers(drivers, query.latitude, query.longitude, radius);

    Ok(Json(
        nearby
            .into_iter()
            .map(|(driver, distance_km)| NearbyDriverResponse {
                driver: UserResponse::from(driver),
                distance_km: (distance_km * 100.0).round() / 100.0,
            })
            .collect(),
    ))
}
