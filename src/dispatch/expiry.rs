//! Background sweeper for negotiation deadlines and stale presence.
//!
//! Two jobs on one interval:
//! - cancel unassigned rides whose negotiation deadline has passed
//!   (anchored at `scheduled_at` for scheduled rides)
//! - mark drivers offline when their last location fix is older than the
//!   staleness threshold

use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::db::{DbPool, Ride};
use crate::dispatch::RideLifecycle;

pub struct Sweeper {
    db: DbPool,
    lifecycle: RideLifecycle,
    config: DispatchConfig,
}

impl Sweeper {
    pub fn new(db: DbPool, lifecycle: RideLifecycle, config: DispatchConfig) -> Self {
        Self {
            db,
            lifecycle,
            config,
        }
    }

    pub async fn run(self) {
        info!(
            interval_secs = self.config.sweep_interval_secs,
            negotiation_timeout_secs = self.config.negotiation_timeout_secs,
            "Starting dispatch sweeper"
        );
        let mut ticker = interval(Duration::from_secs(self.config.sweep_interval_secs));
        loop {
            ticker.tick().await;
            self.sweep_expired_rides().await;
            self.sweep_stale_presence().await;
        }
    }

    async fn sweep_expired_rides(&self) {
        let cutoff = (chrono::Utc::now()
            - chrono::Duration::seconds(self.config.negotiation_timeout_secs))
        .to_rfc3339();

        let rides = match Ride::expired_unassigned(&self.db, &cutoff).await {
            Ok(rides) => rides,
            Err(e) => {
                warn!(error = %e, "Failed to query expired rides");
                return;
            }
        };

        for ride in rides {
            match self.lifecycle.expire(&ride).await {
                Ok(true) => {
                    info!(ride_id = %ride.id, "Expired unassigned ride");
                }
                Ok(false) => {
                    // A selection or cancellation won the race, nothing to do
                    debug!(ride_id = %ride.id, "Ride changed before expiry, skipping");
                }
                Err(e) => {
                    warn!(ride_id = %ride.id, error = %e, "Failed to expire ride");
                }
            }
        }
    }

    async fn sweep_stale_presence(&self) {
        let cutoff = (chrono::Utc::now()
            - chrono::Duration::seconds(self.config.location_stale_secs))
        .to_rfc3339();

        let result = sqlx::query(
            "UPDATE users SET online = 0 \
             WHERE online = 1 AND (located_at IS NULL OR located_at < ?)",
        )
        .bind(&cutoff)
        .execute(&self.db)
        .await;

        match result {
            Ok(r) if r.rows_affected() > 0 => {
                debug!(count = r.rows_affected(), "Marked stale drivers offline");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to sweep stale presence");
            }
        }
    }
}

/// Spawn the sweeper as a background task
pub fn spawn_sweeper(db: DbPool, lifecycle: RideLifecycle, config: DispatchConfig) {
    let sweeper = Sweeper::new(db, lifecycle, config);
    tokio::spawn(async move {
        sweeper.run().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::events::RideEventBus;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stale_presence_sweep() {
        let pool = db::init_in_memory().await.unwrap();

        // One driver with a fresh fix, one stale, one with no fix at all
        let fresh = chrono::Utc::now().to_rfc3339();
        let stale = (chrono::Utc::now() - chrono::Duration::seconds(600)).to_rfc3339();
        for (id, located_at) in [("fresh", Some(&fresh)), ("stale", Some(&stale)), ("none", None)] {
            sqlx::query(
                "INSERT INTO users (id, email, password_hash, name, role, status, online, located_at) \
                 VALUES (?, ?, 'x', ?, 'driver', 'verified', 1, ?)",
            )
            .bind(id)
            .bind(format!("{id}@example.com"))
            .bind(id)
            .bind(located_at)
            .execute(&pool)
            .await
            .unwrap();
        }

        let lifecycle = RideLifecycle::new(pool.clone(), Arc::new(RideEventBus::new()));
        let sweeper = Sweeper::new(pool.clone(), lifecycle, DispatchConfig::default());
        sweeper.sweep_stale_presence().await;

        let online: Vec<String> =
            sqlx::query_scalar("SELECT id FROM users WHERE online = 1 ORDER BY id")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(online, vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_expired_ride_sweep() {
        let pool = db::init_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role, status) \
             VALUES ('p1', 'p1@example.com', 'x', 'p1', 'passenger', 'active')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let old = (chrono::Utc::now() - chrono::Duration::seconds(700)).to_rfc3339();
        sqlx::query(
            "INSERT INTO rides (id, passenger_id, pickup_address, destination_address, \
             proposed_fare, status, version, created_at, updated_at) \
             VALUES ('r1', 'p1', 'A', 'B', 10.0, 'pending', 0, ?, ?)",
        )
        .bind(&old)
        .bind(&old)
        .execute(&pool)
        .await
        .unwrap();

        let lifecycle = RideLifecycle::new(pool.clone(), Arc::new(RideEventBus::new()));
        let sweeper = Sweeper::new(pool.clone(), lifecycle, DispatchConfig::default());
        sweeper.sweep_expired_rides().await;

        let status: String = sqlx::query_scalar("SELECT status FROM rides WHERE id = 'r1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "cancelled");
    }
}
