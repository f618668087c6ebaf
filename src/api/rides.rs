//! Ride endpoints: quotes, creation, listing, the driver offer board, and
//! lifecycle transitions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{
    CancelRideRequest, CreateRideRequest, DeclineRideRequest, Ride, RideEvent, RideResponse,
    RideStatus, User, UserResponse, UserRole,
};
use crate::dispatch::{self, calculate_fare, FareBreakdown};
use crate::AppState;

use super::auth::require_admin;
use super::error::ApiError;
use super::validation::{validate_latitude, validate_longitude, validate_positive_amount};

pub(super) async fn embed_parties(state: &AppState, ride: Ride) -> Result<RideResponse, ApiError> {
    let passenger = User::find_by_id(&state.db, &ride.passenger_id)
        .await?
        .map(UserResponse::from);
    let driver = match ride.driver_id.as_deref() {
        Some(driver_id) => User::find_by_id(&state.db, driver_id)
            .await?
            .map(UserResponse::from),
        None => None,
    };
    Ok(RideResponse {
        ride,
        passenger,
        driver,
    })
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub distance_miles: f64,
    pub duration_minutes: f64,
}

/// Fare quote for a measured route. Pure arithmetic over the current
/// pricing settings; nothing is persisted.
pub async fn quote(
    State(state): State<Arc<AppState>>,
    _user: User,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<FareBreakdown>, ApiError> {
    if !req.distance_miles.is_finite() || req.distance_miles < 0.0 {
        return Err(ApiError::validation_field(
            "distance_miles",
            "Distance must be a non-negative number",
        ));
    }
    if !req.duration_minutes.is_finite() || req.duration_minutes < 0.0 {
        return Err(ApiError::validation_field(
            "duration_minutes",
            "Duration must be a non-negative number",
        ));
    }

    let settings = state.pricing.load();
    Ok(Json(calculate_fare(
        req.distance_miles,
        req.duration_minutes,
        &settings,
    )))
}

/// Create a ride request
pub async fn create_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateRideRequest>,
) -> Result<(StatusCode, Json<RideResponse>), ApiError> {
    if let Err(e) = validate_positive_amount(req.proposed_fare, "proposed_fare") {
        return Err(ApiError::validation_field("proposed_fare", e));
    }

    let ride = state.lifecycle.create_ride(&user, &req).await?;
    let response = embed_parties(&state, ride).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Debug, Deserialize)]
pub struct ListRidesQuery {
    pub status: Option<String>,
}

/// List rides for the caller: passengers and drivers see their own,
/// admins see everything.
pub async fn list_rides(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<ListRidesQuery>,
) -> Result<Json<Vec<Ride>>, ApiError> {
    let mut rides = match user.get_role() {
        UserRole::Passenger => Ride::list_for_passenger(&state.db, &user.id).await?,
        UserRole::Driver => Ride::list_for_driver(&state.db, &user.id).await?,
        UserRole::Admin => Ride::list_all(&state.db, 500).await?,
    };

    if let Some(status) = query.status {
        rides.retain(|r| r.status == status);
    }

    Ok(Json(rides))
}

/// Get one ride with embedded passenger/driver snapshots
pub async fn get_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<RideResponse>, ApiError> {
    let ride = Ride::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ride not found"))?;

    // Unassigned rides are visible to drivers browsing the board
    let is_party = ride.involves(&user.id);
    let is_browsing_driver =
        user.get_role() == UserRole::Driver && ride.get_status().is_unassigned();
    if !is_party && !is_browsing_driver && !user.is_admin() {
        return Err(ApiError::forbidden("Not a party to this ride"));
    }

    let response = embed_parties(&state, ride).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct BoardQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct BoardEntryResponse {
    #[serde(flatten)]
    pub ride: RideResponse,
    pub distance_km: Option<f64>,
}

/// The driver offer board: unassigned rides near the driver, newest
/// first, rides without pickup coordinates always included.
pub async fn board(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<BoardQuery>,
) -> Result<Json<Vec<BoardEntryResponse>>, ApiError> {
    if !user.is_active_driver() {
        return Err(ApiError::forbidden("Only verified drivers can browse the board"));
    }
    if let Err(e) = validate_latitude(query.latitude) {
        return Err(ApiError::validation_field("latitude", e));
    }
    if let Err(e) = validate_longitude(query.longitude) {
        return Err(ApiError::validation_field("longitude", e));
    }

    let rides = Ride::unassigned_for_driver(&state.db, &user.id).await?;
    let radius = state.config.dispatch.board_radius_km;
    let entries = dispatch::board_entries(rides, query.latitude, query.longitude, radius);

    let mut responses = Vec::with_capacity(entries.len());
    for (ride, distance_km) in entries {
        responses.push(BoardEntryResponse {
            ride: embed_parties(&state, ride).await?,
            distance_km: distance_km.map(|d| (d * 100.0).round() / 100.0),
        });
    }
    Ok(Json(responses))
}

/// Cancel a ride with a reason
pub async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<CancelRideRequest>,
) -> Result<Json<RideResponse>, ApiError> {
    let ride = state.lifecycle.cancel(&user, &id, &req).await?;
    let response = embed_parties(&state, ride).await?;
    Ok(Json(response))
}

/// Driver passes on an unassigned ride
pub async fn decline_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<DeclineRideRequest>,
) -> Result<StatusCode, ApiError> {
    state.lifecycle.decline(&user, &id, &req.reason).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Assigned driver announces arrival at the pickup point
pub async fn mark_arrived(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<RideResponse>, ApiError> {
    let ride = state
        .lifecycle
        .progress(&user, &id, RideStatus::DriverArrived)
        .await?;
    let response = embed_parties(&state, ride).await?;
    Ok(Json(response))
}

/// Assigned driver starts the trip
pub async fn start_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<RideResponse>, ApiError> {
    let ride = state
        .lifecycle
        .progress(&user, &id, RideStatus::InProgress)
        .await?;
    let response = embed_parties(&state, ride).await?;
    Ok(Json(response))
}

/// Assigned driver completes the trip; the final fare is fixed here
pub async fn complete_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<RideResponse>, ApiError> {
    let ride = state
        .lifecycle
        .progress(&user, &id, RideStatus::Completed)
        .await?;
    let response = embed_parties(&state, ride).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Replay cursor: only events with seq greater than this are returned
    #[serde(default)]
    pub after: i64,
}

/// Persisted event backlog for a ride. The WebSocket stream serves the
/// same events live; this endpoint exists for reconnect catch-up and
/// debugging.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<RideEvent>>, ApiError> {
    let ride = Ride::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ride not found"))?;
    if !ride.involves(&user.id) && !user.is_admin() {
        return Err(ApiError::forbidden("Not a party to this ride"));
    }

    let events = RideEvent::list_after(&state.db, &id, query.after).await?;
    Ok(Json(events))
}
