pub mod api;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod events;

pub use db::DbPool;

use arc_swap::ArcSwap;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::config::Config;
use crate::db::PricingSettings;
use crate::dispatch::RideLifecycle;
use crate::events::RideEventBus;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub events: Arc<RideEventBus>,
    pub lifecycle: RideLifecycle,
    /// Hot-swapped fare configuration; readers never block on updates
    pub pricing: ArcSwap<PricingSettings>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, pricing: PricingSettings) -> Self {
        let events = Arc::new(RideEventBus::new());
        let lifecycle = RideLifecycle::new(db.clone(), events.clone());
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            events,
            lifecycle,
            pricing: ArcSwap::from_pointee(pricing),
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
