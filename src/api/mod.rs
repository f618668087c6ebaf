pub mod auth;
pub mod error;
mod kyc;
mod messages;
pub mod metrics;
mod notifications;
mod offers;
mod pricing;
pub mod rate_limit;
mod rides;
mod users;
pub mod validation;
mod vehicles;
mod ws;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (tighter rate limit; /logout and /me authenticate
    // themselves via the extractor rather than the middleware)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::auth_rate_limit_middleware,
        ));

    // WebSocket routes (auth handled in handlers via query param)
    let ws_routes = Router::new().route("/rides/:id/stream", get(ws::ride_stream_ws));

    // Protected API routes
    let api_routes = Router::new()
        // Users
        .route("/users", get(users::list_users))
        .route("/users/nearby-drivers", get(users::nearby_drivers))
        .route("/users/me/location", put(users::update_my_location))
        .route("/users/me/offline", post(users::go_offline))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/status", put(users::update_user_status))
        // Rides
        .route("/rides", post(rides::create_ride))
        .route("/rides", get(rides::list_rides))
        .route("/rides/quote", post(rides::quote))
        .route("/rides/board", get(rides::board))
        .route("/rides/:id", get(rides::get_ride))
        .route("/rides/:id/cancel", post(rides::cancel_ride))
        .route("/rides/:id/decline", post(rides::decline_ride))
        .route("/rides/:id/arrived", post(rides::mark_arrived))
        .route("/rides/:id/start", post(rides::start_ride))
        .route("/rides/:id/complete", post(rides::complete_ride))
        .route("/rides/:id/events", get(rides::list_events))
        // Offers
        .route("/rides/:id/offers", post(offers::make_offer))
        .route("/rides/:id/offers", get(offers::list_offers))
        .route("/rides/:id/offers/:offer_id/select", post(offers::select_offer))
        // Messages
        .route("/rides/:id/messages", post(messages::send_message))
        .route("/rides/:id/messages", get(messages::list_messages))
        .route("/rides/:id/messages/unread", get(messages::unread))
        .route("/rides/:id/messages/read", post(messages::mark_read))
        // KYC
        .route("/kyc", post(kyc::submit))
        .route("/kyc", get(kyc::list))
        .route("/kyc/me", get(kyc::my_kyc))
        .route("/kyc/:id/review", post(kyc::review))
        // Vehicles
        .route("/vehicles", post(vehicles::create_vehicle))
        .route("/vehicles/mine", get(vehicles::my_vehicles))
        .route("/vehicles/driver/:driver_id", get(vehicles::driver_vehicles))
        .route("/vehicles/:id", put(vehicles::update_vehicle))
        .route("/vehicles/:id", delete(vehicles::delete_vehicle))
        // Pricing settings
        .route("/settings/pricing", get(pricing::get_settings))
        .route("/settings/pricing", put(pricing::update_settings))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/:id/read", post(notifications::mark_read))
        // Protected by auth, then rate limited
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::api_rate_limit_middleware,
        ))
        // Merge WS routes (they handle their own auth)
        .merge(ws_routes);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
