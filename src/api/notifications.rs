//! Notification endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::{Notification, User};
use crate::AppState;

use super::error::ApiError;

/// Latest notifications for the caller
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = Notification::list_for_user(&state.db, &user.id, 100).await?;
    Ok(Json(notifications))
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread = Notification::unread_count(&state.db, &user.id).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let updated = Notification::mark_read(&state.db, &id, &user.id).await?;
    if updated == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }
    let unread = Notification::unread_count(&state.db, &user.id).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    Notification::mark_all_read(&state.db, &user.id).await?;
    Ok(Json(UnreadCountResponse { unread: 0 }))
}
