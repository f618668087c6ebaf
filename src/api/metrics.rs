//! Prometheus metrics endpoint and recording helpers.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

use crate::AppState;

// Metric names as constants for consistency
pub const RIDES_CREATED_TOTAL: &str = "rides_created_total";
pub const RIDES_COMPLETED_TOTAL: &str = "rides_completed_total";
pub const RIDES_CANCELLED_TOTAL: &str = "rides_cancelled_total";
pub const OFFERS_MADE_TOTAL: &str = "offers_made_total";
pub const RIDE_STREAMS_OPEN: &str = "ride_streams_open";
pub const DRIVERS_ONLINE: &str = "drivers_online";

/// Initialize the Prometheus metrics recorder and return a handle for
/// rendering metrics. Call once during startup.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    describe_counter!(RIDES_CREATED_TOTAL, "Total rides requested");
    describe_counter!(RIDES_COMPLETED_TOTAL, "Total rides completed");
    describe_counter!(RIDES_CANCELLED_TOTAL, "Total rides cancelled or expired");
    describe_counter!(OFFERS_MADE_TOTAL, "Total driver offers recorded");
    describe_gauge!(RIDE_STREAMS_OPEN, "Open ride event WebSocket streams");
    describe_gauge!(DRIVERS_ONLINE, "Drivers currently marked online");

    handle
}

pub fn record_ride_created() {
    counter!(RIDES_CREATED_TOTAL).increment(1);
}

pub fn record_ride_completed() {
    counter!(RIDES_COMPLETED_TOTAL).increment(1);
}

pub fn record_ride_cancelled() {
    counter!(RIDES_CANCELLED_TOTAL).increment(1);
}

pub fn record_offer_made() {
    counter!(OFFERS_MADE_TOTAL).increment(1);
}

pub fn record_stream_opened() {
    gauge!(RIDE_STREAMS_OPEN).increment(1.0);
}

pub fn record_stream_closed() {
    gauge!(RIDE_STREAMS_OPEN).decrement(1.0);
}

/// GET /metrics - Prometheus text format
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Refresh gauges that are cheaper to sample than to track
    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE online = 1")
            .fetch_one(&state.db)
            .await
    {
        gauge!(DRIVERS_ONLINE).set(count as f64);
    }

    match state.metrics_handle.as_ref() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}
