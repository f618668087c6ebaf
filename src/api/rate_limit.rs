//! Per-IP rate limiting with a fixed window per tier.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::AppState;

/// Rate limit tier for different endpoint types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// General API endpoints
    Api,
    /// Auth endpoints, kept tighter to slow credential stuffing
    Auth,
}

#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

/// Thread-safe rate limiter keyed on (ip, tier)
pub struct RateLimiter {
    entries: DashMap<(IpAddr, RateLimitTier), WindowEntry>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            window: Duration::from_secs(config.window_seconds),
            config,
        }
    }

    fn limit_for(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
        }
    }

    /// Returns `Ok(())` if allowed, `Err(retry_after_seconds)` otherwise
    pub fn check(&self, ip: IpAddr, tier: RateLimitTier) -> Result<(), u64> {
        if !self.config.enabled {
            return Ok(());
        }

        let limit = self.limit_for(tier);
        let now = Instant::now();
        let mut entry = self.entries.entry((ip, tier)).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= limit {
            let elapsed = now.duration_since(entry.window_start);
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop windows that have long since reset
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }
}

fn client_ip(request: &Request<Body>) -> IpAddr {
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

fn rate_limited_response(retry_after: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        "Rate limit exceeded",
    )
        .into_response()
}

pub async fn api_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    match state.rate_limiter.check(ip, RateLimitTier::Api) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => rate_limited_response(retry_after),
    }
}

pub async fn auth_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    match state.rate_limiter.check(ip, RateLimitTier::Auth) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => rate_limited_response(retry_after),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auth_limit: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            window_seconds: 60,
            api_requests_per_window: 100,
            auth_requests_per_window: auth_limit,
        }
    }

    #[test]
    fn test_requests_within_limit_pass() {
        let limiter = RateLimiter::new(config(3));
        let ip = IpAddr::from([10, 0, 0, 1]);
        for _ in 0..3 {
            assert!(limiter.check(ip, RateLimitTier::Auth).is_ok());
        }
        assert!(limiter.check(ip, RateLimitTier::Auth).is_err());
    }

    #[test]
    fn test_tiers_are_independent() {
        let limiter = RateLimiter::new(config(1));
        let ip = IpAddr::from([10, 0, 0, 1]);
        assert!(limiter.check(ip, RateLimitTier::Auth).is_ok());
        assert!(limiter.check(ip, RateLimitTier::Auth).is_err());
        // Api tier still has budget
        assert!(limiter.check(ip, RateLimitTier::Api).is_ok());
    }

    #[test]
    fn test_ips_are_independent() {
        let limiter = RateLimiter::new(config(1));
        assert!(limiter
            .check(IpAddr::from([10, 0, 0, 1]), RateLimitTier::Auth)
            .is_ok());
        assert!(limiter
            .check(IpAddr::from([10, 0, 0, 2]), RateLimitTier::Auth)
            .is_ok());
    }

    #[test]
    fn test_disabled_limiter_always_allows() {
        let mut cfg = config(0);
        cfg.enabled = false;
        let limiter = RateLimiter::new(cfg);
        let ip = IpAddr::from([10, 0, 0, 1]);
        for _ in 0..10 {
            assert!(limiter.check(ip, RateLimitTier::Auth).is_ok());
        }
    }
}
