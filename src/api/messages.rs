//! Per-ride chat between passenger and driver.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::{
    Message, Notification, NotificationKind, Ride, RideEvent, RideEventType, SendMessageRequest,
    User,
};
use crate::AppState;

use super::error::ApiError;

/// Chat opens once a driver is assigned; each party's counterpart is the
/// other side of the ride.
fn counterpart_for(ride: &Ride, user: &User) -> Result<String, ApiError> {
    if ride.passenger_id == user.id {
        return ride
            .driver_id
            .clone()
            .ok_or_else(|| ApiError::conflict("No driver assigned to message yet"));
    }
    if ride.driver_id.as_deref() == Some(user.id.as_str()) {
        return Ok(ride.passenger_id.clone());
    }
    Err(ApiError::forbidden("Not a party to this ride"))
}

/// Send a chat message on a ride
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(ride_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let body = req.body.trim();
    if body.is_empty() {
        return Err(ApiError::validation_field("body", "Message cannot be empty"));
    }
    if body.len() > 2000 {
        return Err(ApiError::validation_field("body", "Message is too long"));
    }

    let ride = Ride::find_by_id(&state.db, &ride_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ride not found"))?;
    if ride.get_status().is_terminal() {
        return Err(ApiError::conflict("Ride is over, chat is closed"));
    }

    let recipient_id = counterpart_for(&ride, &user)?;
    let message = Message::create(&state.db, &ride_id, &user.id, &recipient_id, body).await?;

    // Push to the ride stream and leave an unread marker
    let event = RideEvent::append(
        &state.db,
        &ride_id,
        RideEventType::MessageSent,
        serde_json::json!({
            "message_id": message.id,
            "sender_id": user.id,
            "body": body,
        }),
    )
    .await?;
    state.events.publish(&event);

    if let Err(e) = Notification::create(
        &state.db,
        &recipient_id,
        Some(&ride_id),
        NotificationKind::NewMessage,
        &format!("Message from {}", user.name),
        body,
    )
    .await
    {
        tracing::warn!(ride_id = %ride_id, error = %e, "Failed to create notification");
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// Chat history for a ride, oldest first
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(ride_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let ride = Ride::find_by_id(&state.db, &ride_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ride not found"))?;
    if !ride.involves(&user.id) && !user.is_admin() {
        return Err(ApiError::forbidden("Not a party to this ride"));
    }

    let messages = Message::list_for_ride(&state.db, &ride_id).await?;
    Ok(Json(messages))
}

#[derive(Serialize)]
pub struct UnreadResponse {
    pub unread: i64,
}

/// Unread chat messages addressed to the caller on this ride
pub async fn unread(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(ride_id): Path<String>,
) -> Result<Json<UnreadResponse>, ApiError> {
    let unread = Message::unread_count(&state.db, &ride_id, &user.id).await?;
    Ok(Json(UnreadResponse { unread }))
}

/// Mark the caller's incoming messages on this ride as read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(ride_id): Path<String>,
) -> Result<Json<UnreadResponse>, ApiError> {
    Message::mark_read(&state.db, &ride_id, &user.id).await?;
    Ok(Json(UnreadResponse { unread: 0 }))
}
