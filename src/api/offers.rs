//! Driver offers and passenger selection.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{MakeOfferRequest, OfferResponse, Ride, RideOffer, RideResponse, User, UserResponse};
use crate::AppState;

use super::error::ApiError;
use super::rides::embed_parties;

/// Driver accepts the proposed fare or counters with their own
pub async fn make_offer(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(ride_id): Path<String>,
    Json(req): Json<MakeOfferRequest>,
) -> Result<(StatusCode, Json<RideOffer>), ApiError> {
    let offer = state.lifecycle.make_offer(&user, &ride_id, &req).await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

/// Live offers on a ride with driver snapshots, oldest first.
/// Visible to the requesting passenger and admins; drivers see only
/// their own entry.
pub async fn list_offers(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(ride_id): Path<String>,
) -> Result<Json<Vec<OfferResponse>>, ApiError> {
    let ride = Ride::find_by_id(&state.db, &ride_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ride not found"))?;

    let mut offers = RideOffer::live_for_ride(&state.db, &ride_id).await?;
    let is_passenger = ride.passenger_id == user.id;
    if !is_passenger && !user.is_admin() {
        offers.retain(|o| o.driver_id == user.id);
    }

    let mut responses = Vec::with_capacity(offers.len());
    for offer in offers {
        let driver = User::find_by_id(&state.db, &offer.driver_id)
            .await?
            .map(UserResponse::from);
        responses.push(OfferResponse { offer, driver });
    }
    Ok(Json(responses))
}

/// Passenger picks an offer; the ride moves to `driver_assigned`
pub async fn select_offer(
    State(state): State<Arc<AppState>>,
    user: User,
    Path((ride_id, offer_id)): Path<(String, String)>,
) -> Result<Json<RideResponse>, ApiError> {
    let ride = state
        .lifecycle
        .select_offer(&user, &ride_id, &offer_id)
        .await?;
    let response = embed_parties(&state, ride).await?;
    Ok(Json(response))
}
