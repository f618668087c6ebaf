//! Per-ride WebSocket event streams.
//!
//! Clients connect with their token in the query string (browsers cannot
//! set headers on WebSocket upgrades) and an optional `after` cursor. The
//! server replays the persisted backlog past the cursor, then forwards
//! live events from the broadcast bus. Delivery is monotonic in `seq`;
//! the stream ends after a terminal ride event.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::db::{Ride, RideEvent, User, UserRole};
use crate::AppState;

use super::auth::get_current_user;
use super::metrics;

#[derive(Deserialize)]
pub struct StreamQuery {
    token: Option<String>,
    /// Replay cursor: events with seq greater than this are sent first
    #[serde(default)]
    after: i64,
}

fn may_watch(ride: &Ride, user: &User) -> bool {
    if ride.involves(&user.id) || user.is_admin() {
        return true;
    }
    // Drivers browsing the board may watch unassigned rides
    user.get_role() == UserRole::Driver && ride.get_status().is_unassigned()
}

/// WebSocket endpoint for a ride's event stream
pub async fn ride_stream_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(ride_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let token = query.token.as_deref().ok_or(StatusCode::UNAUTHORIZED)?;
    let user = get_current_user(&state.db, &state.config, token).await?;

    let ride = Ride::find_by_id(&state.db, &ride_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if !may_watch(&ride, &user) {
        return Err(StatusCode::FORBIDDEN);
    }

    let after = query.after;
    let already_over = ride.get_status().is_terminal();
    Ok(ws.on_upgrade(move |socket| async move {
        metrics::record_stream_opened();
        handle_ride_stream(socket, state, ride_id, after, already_over).await;
        metrics::record_stream_closed();
    }))
}

fn event_json(event: &RideEvent) -> String {
    serde_json::json!({
        "seq": event.seq,
        "event_type": event.event_type,
        "payload": serde_json::from_str::<serde_json::Value>(&event.payload)
            .unwrap_or(serde_json::Value::Null),
        "created_at": event.created_at,
    })
    .to_string()
}

async fn handle_ride_stream(
    socket: WebSocket,
    state: Arc<AppState>,
    ride_id: String,
    after: i64,
    already_over: bool,
) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the backlog so nothing lands in the gap
    // between the snapshot and the live feed
    let mut live = state.events.subscribe(&ride_id);

    let mut last_seq = after;
    let mut terminal = false;

    match RideEvent::list_after(&state.db, &ride_id, after).await {
        Ok(backlog) => {
            for event in backlog {
                last_seq = event.seq;
                terminal = event.get_event_type().map(|t| t.is_terminal()).unwrap_or(false);
                if sender.send(Message::Text(event_json(&event))).await.is_err() {
                    return;
                }
            }
        }
        Err(e) => {
            tracing::warn!(ride_id = %ride_id, error = %e, "Failed to load event backlog");
            return;
        }
    }

    // A ride that is already over has nothing further to push, whether or
    // not its terminal event fell inside the replay window
    if terminal || already_over {
        let _ = sender.send(Message::Text(r#"{"type":"end"}"#.to_string())).await;
        return;
    }

    loop {
        tokio::select! {
            event = live.recv() => {
                match event {
                    Ok(event) => {
                        // The backlog may already contain this event
                        if event.seq <= last_seq {
                            continue;
                        }
                        last_seq = event.seq;
                        let is_terminal =
                            event.get_event_type().map(|t| t.is_terminal()).unwrap_or(false);
                        if sender.send(Message::Text(event_json(&event))).await.is_err() {
                            return;
                        }
                        if is_terminal {
                            let _ = sender
                                .send(Message::Text(r#"{"type":"end"}"#.to_string()))
                                .await;
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Fell behind the broadcast buffer; resync from the log
                        tracing::debug!(ride_id = %ride_id, skipped, "Stream lagged, resyncing");
                        match RideEvent::list_after(&state.db, &ride_id, last_seq).await {
                            Ok(missed) => {
                                for event in missed {
                                    last_seq = event.seq;
                                    let is_terminal = event
                                        .get_event_type()
                                        .map(|t| t.is_terminal())
                                        .unwrap_or(false);
                                    if sender
                                        .send(Message::Text(event_json(&event)))
                                        .await
                                        .is_err()
                                    {
                                        return;
                                    }
                                    if is_terminal {
                                        let _ = sender
                                            .send(Message::Text(
                                                r#"{"type":"end"}"#.to_string(),
                                            ))
                                            .await;
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!(ride_id = %ride_id, error = %e, "Resync failed");
                                return;
                            }
                        }
                    }
                    Err(RecvError::Closed) => {
                        let _ = sender
                            .send(Message::Text(r#"{"type":"end"}"#.to_string()))
                            .await;
                        return;
                    }
                }
            }

            // Handle incoming messages (for ping/pong or close)
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
