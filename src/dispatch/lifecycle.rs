//! Ride lifecycle service.
//!
//! All ride state transitions go through here. Each transition is a
//! compare-and-swap on `(id, version)`: the row is updated only if the
//! version the caller read is still current, and the version is bumped
//! atomically. A lost race surfaces as `LifecycleError::VersionConflict`
//! instead of a silent overwrite. Every applied transition appends a
//! `RideEvent` and publishes it to live subscribers.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::api::metrics;
use crate::db::{
    CancelRideRequest, CreateRideRequest, DbPool, MakeOfferRequest, Notification,
    NotificationKind, OfferKind, Ride, RideEvent, RideEventType, RideOffer, RideStatus, RideType,
    User, UserRole, UserStatus,
};
use crate::events::RideEventBus;

/// Minimum length of a trimmed cancellation/decline reason
pub const MIN_REASON_LEN: usize = 5;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Ride not found")]
    RideNotFound,

    #[error("Offer not found")]
    OfferNotFound,

    #[error("Ride is {from}, cannot move to {to}")]
    InvalidTransition { from: RideStatus, to: RideStatus },

    #[error("Ride was modified concurrently, retry with fresh state")]
    VersionConflict,

    #[error("{0}")]
    NotAllowed(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn validate_reason(reason: &str) -> Result<String, LifecycleError> {
    let trimmed = reason.trim();
    if trimmed.len() < MIN_REASON_LEN {
        return Err(LifecycleError::InvalidInput(format!(
            "Reason must be at least {MIN_REASON_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), LifecycleError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(LifecycleError::InvalidInput(format!(
            "Invalid latitude: {latitude}"
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(LifecycleError::InvalidInput(format!(
            "Invalid longitude: {longitude}"
        )));
    }
    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Owns ride state transitions. Cheap to clone.
#[derive(Clone)]
pub struct RideLifecycle {
    db: DbPool,
    events: Arc<RideEventBus>,
}

impl RideLifecycle {
    pub fn new(db: DbPool, events: Arc<RideEventBus>) -> Self {
        Self { db, events }
    }

    async fn append_event(
        &self,
        ride_id: &str,
        event_type: RideEventType,
        payload: serde_json::Value,
    ) -> Result<(), LifecycleError> {
        let event = RideEvent::append(&self.db, ride_id, event_type, payload).await?;
        self.events.publish(&event);
        Ok(())
    }

    async fn notify(
        &self,
        user_id: &str,
        ride_id: &str,
        kind: NotificationKind,
        title: &str,
        body: &str,
    ) {
        // Notification failures never fail the transition that caused them
        if let Err(e) =
            Notification::create(&self.db, user_id, Some(ride_id), kind, title, body).await
        {
            warn!(user_id = %user_id, ride_id = %ride_id, error = %e, "Failed to create notification");
        }
    }

    /// Create a ride in `pending`. Idempotent on `client_request_id`:
    /// re-submitting the same key returns the already-created ride.
    pub async fn create_ride(
        &self,
        passenger: &User,
        req: &CreateRideRequest,
    ) -> Result<Ride, LifecycleError> {
        if passenger.get_role() != UserRole::Passenger {
            return Err(LifecycleError::NotAllowed(
                "Only passengers can request rides".to_string(),
            ));
        }
        match passenger.get_status() {
            UserStatus::Active | UserStatus::Verified => {}
            UserStatus::Pending => {
                return Err(LifecycleError::NotAllowed(
                    "Account is pending verification".to_string(),
                ))
            }
            UserStatus::Suspended => {
                return Err(LifecycleError::NotAllowed(
                    "Account is suspended".to_string(),
                ))
            }
        }

        if req.pickup_address.trim().is_empty() {
            return Err(LifecycleError::InvalidInput(
                "Pickup address is required".to_string(),
            ));
        }
        if req.destination_address.trim().is_empty() {
            return Err(LifecycleError::InvalidInput(
                "Destination address is required".to_string(),
            ));
        }
        if !req.proposed_fare.is_finite() || req.proposed_fare <= 0.0 {
            return Err(LifecycleError::InvalidInput(
                "Proposed fare must be positive".to_string(),
            ));
        }
        if !(1..=8).contains(&req.passengers) {
            return Err(LifecycleError::InvalidInput(
                "Passenger count must be between 1 and 8".to_string(),
            ));
        }
        if let (Some(lat), Some(lon)) = (req.pickup_latitude, req.pickup_longitude) {
            validate_coordinates(lat, lon)?;
        }
        if let (Some(lat), Some(lon)) = (req.destination_latitude, req.destination_longitude) {
            validate_coordinates(lat, lon)?;
        }

        let scheduled_at = match req.ride_type {
            RideType::Scheduled => {
                let at = req.scheduled_at.as_deref().ok_or_else(|| {
                    LifecycleError::InvalidInput(
                        "Scheduled rides require a scheduled_at time".to_string(),
                    )
                })?;
                let parsed = chrono::DateTime::parse_from_rfc3339(at).map_err(|_| {
                    LifecycleError::InvalidInput(
                        "scheduled_at must be an RFC 3339 timestamp".to_string(),
                    )
                })?;
                Some(parsed.to_utc().to_rfc3339())
            }
            RideType::Now => None,
        };

        if let Some(key) = req.client_request_id.as_deref() {
            if let Some(existing) = Ride::find_by_request_id(&self.db, &passenger.id, key).await? {
                return Ok(existing);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let proposed_fare = round2(req.proposed_fare);

        let inserted = sqlx::query(
            "INSERT INTO rides \
             (id, passenger_id, pickup_address, pickup_latitude, pickup_longitude, \
              destination_address, destination_latitude, destination_longitude, \
              passengers, ride_type, scheduled_at, distance_miles, duration_minutes, \
              proposed_fare, status, version, client_request_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&passenger.id)
        .bind(req.pickup_address.trim())
        .bind(req.pickup_latitude)
        .bind(req.pickup_longitude)
        .bind(req.destination_address.trim())
        .bind(req.destination_latitude)
        .bind(req.destination_longitude)
        .bind(req.passengers)
        .bind(req.ride_type.as_str())
        .bind(&scheduled_at)
        .bind(req.distance_miles)
        .bind(req.duration_minutes)
        .bind(proposed_fare)
        .bind(&req.client_request_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await;

        if let Err(e) = inserted {
            // Two submissions of the same idempotency key can race past the
            // lookup above; the unique index decides, and the loser returns
            // the winner's ride.
            if let (Some(key), sqlx::Error::Database(db_err)) =
                (req.client_request_id.as_deref(), &e)
            {
                if db_err.message().contains("UNIQUE constraint failed") {
                    if let Some(existing) =
                        Ride::find_by_request_id(&self.db, &passenger.id, key).await?
                    {
                        return Ok(existing);
                    }
                }
            }
            return Err(e.into());
        }

        self.append_event(
            &id,
            RideEventType::RideCreated,
            serde_json::json!({
                "passenger_id": passenger.id,
                "proposed_fare": proposed_fare,
                "pickup_address": req.pickup_address.trim(),
                "destination_address": req.destination_address.trim(),
            }),
        )
        .await?;

        metrics::record_ride_created();

        Ok(Ride::find_by_id(&self.db, &id)
            .await?
            .ok_or(LifecycleError::RideNotFound)?)
    }

    /// Record a driver's accept or counter-offer on an unassigned ride.
    /// A driver re-offering replaces their previous live offer.
    pub async fn make_offer(
        &self,
        driver: &User,
        ride_id: &str,
        req: &MakeOfferRequest,
    ) -> Result<RideOffer, LifecycleError> {
        if !driver.is_active_driver() {
            return Err(LifecycleError::NotAllowed(
                "Only verified drivers can offer on rides".to_string(),
            ));
        }

        let ride = Ride::find_by_id(&self.db, ride_id)
            .await?
            .ok_or(LifecycleError::RideNotFound)?;

        if ride.passenger_id == driver.id {
            return Err(LifecycleError::NotAllowed(
                "Cannot offer on your own ride".to_string(),
            ));
        }
        if !ride.get_status().is_unassigned() {
            return Err(LifecycleError::NotAllowed(
                "Ride is no longer accepting offers".to_string(),
            ));
        }

        let amount = match req.kind {
            OfferKind::Accept => ride.proposed_fare,
            OfferKind::Counter => {
                let amount = req.amount.ok_or_else(|| {
                    LifecycleError::InvalidInput(
                        "Counter-offers require an amount".to_string(),
                    )
                })?;
                if !amount.is_finite() || amount <= 0.0 {
                    return Err(LifecycleError::InvalidInput(
                        "Offer amount must be positive".to_string(),
                    ));
                }
                round2(amount)
            }
        };

        let withdrawn =
            RideOffer::withdraw_live_for_driver(&self.db, ride_id, &driver.id).await?;
        if withdrawn > 0 {
            self.append_event(
                ride_id,
                RideEventType::OfferWithdrawn,
                serde_json::json!({ "driver_id": driver.id, "replaced": true }),
            )
            .await?;
        }

        let offer_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO ride_offers (id, ride_id, driver_id, kind, amount, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(&offer_id)
        .bind(ride_id)
        .bind(&driver.id)
        .bind(req.kind.as_str())
        .bind(amount)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        // First offer moves the ride onto the negotiation track
        if ride.get_status() == RideStatus::Pending {
            let moved = sqlx::query(
                "UPDATE rides SET status = 'accepted', version = version + 1, updated_at = ? \
                 WHERE id = ? AND version = ? AND status = 'pending'",
            )
            .bind(&now)
            .bind(ride_id)
            .bind(ride.version)
            .execute(&self.db)
            .await?;

            if moved.rows_affected() == 0 {
                // Lost a race; only proceed if the ride is still unassigned
                let current = Ride::find_by_id(&self.db, ride_id)
                    .await?
                    .ok_or(LifecycleError::RideNotFound)?;
                if !current.get_status().is_unassigned() {
                    RideOffer::withdraw_live_for_driver(&self.db, ride_id, &driver.id).await?;
                    return Err(LifecycleError::NotAllowed(
                        "Ride is no longer accepting offers".to_string(),
                    ));
                }
            }
        }

        self.append_event(
            ride_id,
            RideEventType::OfferMade,
            serde_json::json!({
                "offer_id": offer_id,
                "driver_id": driver.id,
                "kind": req.kind.as_str(),
                "amount": amount,
            }),
        )
        .await?;

        let title = match req.kind {
            OfferKind::Accept => format!("{} accepted your fare", driver.name),
            OfferKind::Counter => format!("{} countered with {amount:.2}", driver.name),
        };
        self.notify(
            &ride.passenger_id,
            ride_id,
            NotificationKind::OfferMade,
            &title,
            "Open the ride to choose a driver",
        )
        .await;

        metrics::record_offer_made();

        Ok(RideOffer::find_by_id(&self.db, &offer_id)
            .await?
            .ok_or(LifecycleError::OfferNotFound)?)
    }

    /// Passenger picks one offer; the ride gets its driver and accepted
    /// fare, every other live offer is rejected.
    pub async fn select_offer(
        &self,
        passenger: &User,
        ride_id: &str,
        offer_id: &str,
    ) -> Result<Ride, LifecycleError> {
        let ride = Ride::find_by_id(&self.db, ride_id)
            .await?
            .ok_or(LifecycleError::RideNotFound)?;

        if ride.passenger_id != passenger.id && !passenger.is_admin() {
            return Err(LifecycleError::NotAllowed(
                "Only the requesting passenger can choose a driver".to_string(),
            ));
        }
        let status = ride.get_status();
        if !status.is_unassigned() {
            return Err(LifecycleError::InvalidTransition {
                from: status,
                to: RideStatus::DriverAssigned,
            });
        }

        let offer = RideOffer::find_by_id(&self.db, offer_id)
            .await?
            .ok_or(LifecycleError::OfferNotFound)?;
        if offer.ride_id != ride.id {
            return Err(LifecycleError::OfferNotFound);
        }
        if offer.get_status() != crate::db::OfferStatus::Pending {
            return Err(LifecycleError::NotAllowed(
                "Offer is no longer open".to_string(),
            ));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE rides SET driver_id = ?, accepted_fare = ?, status = 'driver_assigned', \
             version = version + 1, updated_at = ? \
             WHERE id = ? AND version = ? AND status IN ('pending', 'accepted')",
        )
        .bind(&offer.driver_id)
        .bind(offer.amount)
        .bind(&now)
        .bind(&ride.id)
        .bind(ride.version)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LifecycleError::VersionConflict);
        }

        RideOffer::resolve_selection(&self.db, &ride.id, &offer.id).await?;

        self.append_event(
            &ride.id,
            RideEventType::DriverAssigned,
            serde_json::json!({
                "driver_id": offer.driver_id,
                "offer_id": offer.id,
                "accepted_fare": offer.amount,
            }),
        )
        .await?;

        self.notify(
            &offer.driver_id,
            &ride.id,
            NotificationKind::DriverAssigned,
            "You got the ride",
            &format!("Pickup at {}", ride.pickup_address),
        )
        .await;
        self.notify(
            &ride.passenger_id,
            &ride.id,
            NotificationKind::DriverAssigned,
            "Driver confirmed",
            "Your driver is on the way",
        )
        .await;

        Ok(Ride::find_by_id(&self.db, &ride.id)
            .await?
            .ok_or(LifecycleError::RideNotFound)?)
    }

    /// Driver passes on an unassigned ride. The ride stays available to
    /// other drivers; this driver's board no longer shows it.
    pub async fn decline(
        &self,
        driver: &User,
        ride_id: &str,
        reason: &str,
    ) -> Result<(), LifecycleError> {
        if driver.get_role() != UserRole::Driver {
            return Err(LifecycleError::NotAllowed(
                "Only drivers can decline rides".to_string(),
            ));
        }
        let reason = validate_reason(reason)?;

        let ride = Ride::find_by_id(&self.db, ride_id)
            .await?
            .ok_or(LifecycleError::RideNotFound)?;
        if !ride.get_status().is_unassigned() {
            return Err(LifecycleError::NotAllowed(
                "Ride is no longer open".to_string(),
            ));
        }

        sqlx::query(
            "INSERT OR IGNORE INTO ride_declines (ride_id, driver_id, reason, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(ride_id)
        .bind(&driver.id)
        .bind(&reason)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        let withdrawn =
            RideOffer::withdraw_live_for_driver(&self.db, ride_id, &driver.id).await?;
        if withdrawn > 0 {
            self.append_event(
                ride_id,
                RideEventType::OfferWithdrawn,
                serde_json::json!({ "driver_id": driver.id, "replaced": false }),
            )
            .await?;
        }

        Ok(())
    }

    /// Cancel a ride. Allowed for the passenger before completion, the
    /// assigned driver after assignment, and admins. The reason is
    /// validated server-side before any state change.
    pub async fn cancel(
        &self,
        user: &User,
        ride_id: &str,
        req: &CancelRideRequest,
    ) -> Result<Ride, LifecycleError> {
        let reason = validate_reason(&req.reason)?;

        let ride = Ride::find_by_id(&self.db, ride_id)
            .await?
            .ok_or(LifecycleError::RideNotFound)?;

        let is_passenger = ride.passenger_id == user.id;
        let is_assigned_driver = ride.driver_id.as_deref() == Some(user.id.as_str());
        if !is_passenger && !is_assigned_driver && !user.is_admin() {
            return Err(LifecycleError::NotAllowed(
                "Not a party to this ride".to_string(),
            ));
        }

        let status = ride.get_status();
        if !status.can_transition_to(RideStatus::Cancelled) {
            return Err(LifecycleError::InvalidTransition {
                from: status,
                to: RideStatus::Cancelled,
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE rides SET status = 'cancelled', cancellation_reason = ?, cancelled_by = ?, \
             version = version + 1, updated_at = ? \
             WHERE id = ? AND version = ?",
        )
        .bind(&reason)
        .bind(&user.id)
        .bind(&now)
        .bind(&ride.id)
        .bind(ride.version)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LifecycleError::VersionConflict);
        }

        self.append_event(
            &ride.id,
            RideEventType::RideCancelled,
            serde_json::json!({ "reason": reason, "cancelled_by": user.id }),
        )
        .await?;

        // Tell the other party, if there is one
        let counterpart = if is_passenger {
            ride.driver_id.clone()
        } else {
            Some(ride.passenger_id.clone())
        };
        if let Some(counterpart_id) = counterpart {
            self.notify(
                &counterpart_id,
                &ride.id,
                NotificationKind::RideCancelled,
                "Ride cancelled",
                &reason,
            )
            .await;
        }

        metrics::record_ride_cancelled();

        Ok(Ride::find_by_id(&self.db, &ride.id)
            .await?
            .ok_or(LifecycleError::RideNotFound)?)
    }

    /// Assigned-driver progress transitions: arrived, started, completed
    pub async fn progress(
        &self,
        driver: &User,
        ride_id: &str,
        target: RideStatus,
    ) -> Result<Ride, LifecycleError> {
        let ride = Ride::find_by_id(&self.db, ride_id)
            .await?
            .ok_or(LifecycleError::RideNotFound)?;

        if ride.driver_id.as_deref() != Some(driver.id.as_str()) && !driver.is_admin() {
            return Err(LifecycleError::NotAllowed(
                "Only the assigned driver can update ride progress".to_string(),
            ));
        }

        let event_type = match target {
            RideStatus::DriverArrived => RideEventType::DriverArrived,
            RideStatus::InProgress => RideEventType::RideStarted,
            RideStatus::Completed => RideEventType::RideCompleted,
            other => {
                return Err(LifecycleError::InvalidTransition {
                    from: ride.get_status(),
                    to: other,
                })
            }
        };

        let status = ride.get_status();
        if !status.can_transition_to(target) {
            return Err(LifecycleError::InvalidTransition {
                from: status,
                to: target,
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        let result = if target == RideStatus::Completed {
            // Fares narrow monotonically: the final fare is whatever was
            // agreed, falling back to the passenger's proposal
            let final_fare = ride.accepted_fare.unwrap_or(ride.proposed_fare);
            sqlx::query(
                "UPDATE rides SET status = ?, final_fare = ?, version = version + 1, updated_at = ? \
                 WHERE id = ? AND version = ?",
            )
            .bind(target.as_str())
            .bind(final_fare)
            .bind(&now)
            .bind(&ride.id)
            .bind(ride.version)
            .execute(&self.db)
            .await?
        } else {
            sqlx::query(
                "UPDATE rides SET status = ?, version = version + 1, updated_at = ? \
                 WHERE id = ? AND version = ?",
            )
            .bind(target.as_str())
            .bind(&now)
            .bind(&ride.id)
            .bind(ride.version)
            .execute(&self.db)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(LifecycleError::VersionConflict);
        }

        let updated = Ride::find_by_id(&self.db, &ride.id)
            .await?
            .ok_or(LifecycleError::RideNotFound)?;

        self.append_event(
            &ride.id,
            event_type,
            serde_json::json!({
                "status": target.as_str(),
                "final_fare": updated.final_fare,
            }),
        )
        .await?;

        let (kind, title) = match target {
            RideStatus::DriverArrived => (NotificationKind::DriverArrived, "Your driver has arrived"),
            RideStatus::InProgress => (NotificationKind::RideStarted, "Your ride has started"),
            _ => (NotificationKind::RideCompleted, "Your ride is complete"),
        };
        self.notify(&ride.passenger_id, &ride.id, kind, title, &ride.destination_address)
            .await;

        if target == RideStatus::Completed {
            metrics::record_ride_completed();
        }

        Ok(updated)
    }

    /// Store a location fix and push it to the user's active ride, if any
    pub async fn record_location(
        &self,
        user: &User,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), LifecycleError> {
        validate_coordinates(latitude, longitude)?;

        User::update_location(&self.db, &user.id, latitude, longitude).await?;

        if let Some(ride) = Ride::active_for_user(&self.db, &user.id).await? {
            self.append_event(
                &ride.id,
                RideEventType::LocationUpdated,
                serde_json::json!({
                    "user_id": user.id,
                    "role": user.role,
                    "latitude": latitude,
                    "longitude": longitude,
                }),
            )
            .await?;
        }

        Ok(())
    }

    /// Expire an unassigned ride whose negotiation deadline passed.
    /// Used by the sweeper; races with late selections are resolved by the
    /// version check (the selection wins if it landed first).
    pub async fn expire(&self, ride: &Ride) -> Result<bool, LifecycleError> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE rides SET status = 'cancelled', cancellation_reason = ?, cancelled_by = 'system', \
             version = version + 1, updated_at = ? \
             WHERE id = ? AND version = ? AND status IN ('pending', 'accepted')",
        )
        .bind("No driver accepted the ride in time")
        .bind(&now)
        .bind(&ride.id)
        .bind(ride.version)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.append_event(
            &ride.id,
            RideEventType::RideCancelled,
            serde_json::json!({
                "reason": "No driver accepted the ride in time",
                "cancelled_by": "system",
            }),
        )
        .await?;

        self.notify(
            &ride.passenger_id,
            &ride.id,
            NotificationKind::RideCancelled,
            "No drivers available",
            "Nobody accepted your ride in time. Please try again.",
        )
        .await;

        metrics::record_ride_cancelled();

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, OfferStatus};

    async fn setup() -> (DbPool, RideLifecycle) {
        let pool = db::init_in_memory().await.unwrap();
        let lifecycle = RideLifecycle::new(pool.clone(), Arc::new(RideEventBus::new()));
        (pool, lifecycle)
    }

    async fn insert_user(pool: &DbPool, id: &str, role: &str, status: &str) -> User {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role, status) \
             VALUES (?, ?, 'x', ?, ?, ?)",
        )
        .bind(id)
        .bind(format!("{id}@example.com"))
        .bind(id)
        .bind(role)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
        User::find_by_id(pool, id).await.unwrap().unwrap()
    }

    fn ride_request() -> CreateRideRequest {
        CreateRideRequest {
            pickup_address: "12 Main St".to_string(),
            pickup_latitude: Some(52.52),
            pickup_longitude: Some(13.405),
            destination_address: "Airport".to_string(),
            destination_latitude: Some(52.36),
            destination_longitude: Some(13.50),
            passengers: 2,
            ride_type: RideType::Now,
            scheduled_at: None,
            distance_miles: Some(14.0),
            duration_minutes: Some(30.0),
            proposed_fare: 25.0,
            client_request_id: None,
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_happy_path() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let driver = insert_user(&pool, "d1", "driver", "verified").await;

        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();
        assert_eq!(ride.get_status(), RideStatus::Pending);
        assert_eq!(ride.version, 0);

        let offer = lifecycle
            .make_offer(
                &driver,
                &ride.id,
                &MakeOfferRequest {
                    kind: OfferKind::Counter,
                    amount: Some(30.0),
                },
            )
            .await
            .unwrap();
        assert_eq!(offer.amount, 30.0);

        let ride = Ride::find_by_id(&pool, &ride.id).await.unwrap().unwrap();
        assert_eq!(ride.get_status(), RideStatus::Accepted);

        let ride = lifecycle.select_offer(&passenger, &ride.id, &offer.id).await.unwrap();
        assert_eq!(ride.get_status(), RideStatus::DriverAssigned);
        assert_eq!(ride.driver_id.as_deref(), Some("d1"));
        assert_eq!(ride.accepted_fare, Some(30.0));

        let ride = lifecycle.progress(&driver, &ride.id, RideStatus::DriverArrived).await.unwrap();
        assert_eq!(ride.get_status(), RideStatus::DriverArrived);

        let ride = lifecycle.progress(&driver, &ride.id, RideStatus::InProgress).await.unwrap();
        assert_eq!(ride.get_status(), RideStatus::InProgress);

        let ride = lifecycle.progress(&driver, &ride.id, RideStatus::Completed).await.unwrap();
        assert_eq!(ride.get_status(), RideStatus::Completed);
        // Fare narrowed proposed -> accepted -> final
        assert_eq!(ride.final_fare, Some(30.0));

        // Version bumped once per transition: offer, select, arrive, start, complete
        assert_eq!(ride.version, 5);

        // Event log is a complete, ordered account of the ride
        let events = RideEvent::list_after(&pool, &ride.id, 0).await.unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "ride_created",
                "offer_made",
                "driver_assigned",
                "driver_arrived",
                "ride_started",
                "ride_completed"
            ]
        );
        let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_create_is_idempotent_on_request_id() {
        let (_pool, lifecycle) = setup().await;
        let passenger = insert_user(&_pool, "p1", "passenger", "active").await;

        let mut req = ride_request();
        req.client_request_id = Some("req-abc".to_string());

        let first = lifecycle.create_ride(&passenger, &req).await.unwrap();
        let second = lifecycle.create_ride(&passenger, &req).await.unwrap();
        assert_eq!(first.id, second.id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rides")
            .fetch_one(&_pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_pending_passenger_cannot_request_rides() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "pending").await;

        let err = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn test_accept_offer_uses_proposed_fare() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let driver = insert_user(&pool, "d1", "driver", "verified").await;

        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();
        let offer = lifecycle
            .make_offer(&driver, &ride.id, &MakeOfferRequest { kind: OfferKind::Accept, amount: None })
            .await
            .unwrap();
        assert_eq!(offer.amount, 25.0);
    }

    #[tokio::test]
    async fn test_reoffer_replaces_previous_offer() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let driver = insert_user(&pool, "d1", "driver", "verified").await;

        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();
        let first = lifecycle
            .make_offer(&driver, &ride.id, &MakeOfferRequest { kind: OfferKind::Counter, amount: Some(40.0) })
            .await
            .unwrap();
        let second = lifecycle
            .make_offer(&driver, &ride.id, &MakeOfferRequest { kind: OfferKind::Counter, amount: Some(35.0) })
            .await
            .unwrap();

        let first = RideOffer::find_by_id(&pool, &first.id).await.unwrap().unwrap();
        assert_eq!(first.get_status(), OfferStatus::Withdrawn);
        let live = RideOffer::live_for_ride(&pool, &ride.id).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, second.id);
    }

    #[tokio::test]
    async fn test_unverified_driver_cannot_offer() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let driver = insert_user(&pool, "d1", "driver", "pending").await;

        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();
        let err = lifecycle
            .make_offer(&driver, &ride.id, &MakeOfferRequest { kind: OfferKind::Accept, amount: None })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn test_selection_rejects_other_offers() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let d1 = insert_user(&pool, "d1", "driver", "verified").await;
        let d2 = insert_user(&pool, "d2", "driver", "verified").await;

        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();
        let o1 = lifecycle
            .make_offer(&d1, &ride.id, &MakeOfferRequest { kind: OfferKind::Accept, amount: None })
            .await
            .unwrap();
        let o2 = lifecycle
            .make_offer(&d2, &ride.id, &MakeOfferRequest { kind: OfferKind::Counter, amount: Some(20.0) })
            .await
            .unwrap();

        lifecycle.select_offer(&passenger, &ride.id, &o2.id).await.unwrap();

        let o1 = RideOffer::find_by_id(&pool, &o1.id).await.unwrap().unwrap();
        let o2 = RideOffer::find_by_id(&pool, &o2.id).await.unwrap().unwrap();
        assert_eq!(o1.get_status(), OfferStatus::Rejected);
        assert_eq!(o2.get_status(), OfferStatus::Selected);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let driver = insert_user(&pool, "d1", "driver", "verified").await;

        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();
        let offer = lifecycle
            .make_offer(&driver, &ride.id, &MakeOfferRequest { kind: OfferKind::Accept, amount: None })
            .await
            .unwrap();

        // A write with an outdated version must not touch the row
        let result = sqlx::query(
            "UPDATE rides SET status = 'driver_assigned', version = version + 1 \
             WHERE id = ? AND version = ?",
        )
        .bind(&ride.id)
        .bind(ride.version) // version before the offer bumped it
        .execute(&pool)
        .await
        .unwrap();
        assert_eq!(result.rows_affected(), 0);

        // While a reader with fresh state succeeds
        let ride = lifecycle.select_offer(&passenger, &ride.id, &offer.id).await.unwrap();
        assert_eq!(ride.get_status(), RideStatus::DriverAssigned);
    }

    #[tokio::test]
    async fn test_cancel_requires_meaningful_reason() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();

        // Four characters after trimming is not enough
        let err = lifecycle
            .cancel(&passenger, &ride.id, &CancelRideRequest { reason: "  plz  ".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidInput(_)));

        let ride_after = Ride::find_by_id(&pool, &ride.id).await.unwrap().unwrap();
        assert_eq!(ride_after.get_status(), RideStatus::Pending);

        lifecycle
            .cancel(&passenger, &ride.id, &CancelRideRequest { reason: "Changed my plans".to_string() })
            .await
            .unwrap();
        let ride_after = Ride::find_by_id(&pool, &ride.id).await.unwrap().unwrap();
        assert_eq!(ride_after.get_status(), RideStatus::Cancelled);
        assert_eq!(ride_after.cancelled_by.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_stranger_cannot_cancel() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let stranger = insert_user(&pool, "p2", "passenger", "active").await;
        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();

        let err = lifecycle
            .cancel(&stranger, &ride.id, &CancelRideRequest { reason: "not my ride".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn test_completed_ride_cannot_be_cancelled() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let driver = insert_user(&pool, "d1", "driver", "verified").await;

        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();
        let offer = lifecycle
            .make_offer(&driver, &ride.id, &MakeOfferRequest { kind: OfferKind::Accept, amount: None })
            .await
            .unwrap();
        lifecycle.select_offer(&passenger, &ride.id, &offer.id).await.unwrap();
        lifecycle.progress(&driver, &ride.id, RideStatus::DriverArrived).await.unwrap();
        lifecycle.progress(&driver, &ride.id, RideStatus::InProgress).await.unwrap();
        lifecycle.progress(&driver, &ride.id, RideStatus::Completed).await.unwrap();

        let err = lifecycle
            .cancel(&passenger, &ride.id, &CancelRideRequest { reason: "too late now".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_decline_hides_ride_from_driver_board() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let driver = insert_user(&pool, "d1", "driver", "verified").await;

        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();
        lifecycle.decline(&driver, &ride.id, "Too far from me").await.unwrap();

        let board = Ride::unassigned_for_driver(&pool, "d1").await.unwrap();
        assert!(board.is_empty());

        // Other drivers still see it
        let board = Ride::unassigned_for_driver(&pool, "d2").await.unwrap();
        assert_eq!(board.len(), 1);

        // Ride itself is untouched
        let ride = Ride::find_by_id(&pool, &ride.id).await.unwrap().unwrap();
        assert_eq!(ride.get_status(), RideStatus::Pending);
    }

    #[tokio::test]
    async fn test_expire_skips_assigned_rides() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let driver = insert_user(&pool, "d1", "driver", "verified").await;

        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();
        let offer = lifecycle
            .make_offer(&driver, &ride.id, &MakeOfferRequest { kind: OfferKind::Accept, amount: None })
            .await
            .unwrap();
        lifecycle.select_offer(&passenger, &ride.id, &offer.id).await.unwrap();

        // The sweeper read a stale unassigned row; expire must not fire
        let stale = Ride { version: 0, status: "pending".to_string(), ..ride };
        let expired = lifecycle.expire(&stale).await.unwrap();
        assert!(!expired);

        let ride = Ride::find_by_id(&pool, &stale.id).await.unwrap().unwrap();
        assert_eq!(ride.get_status(), RideStatus::DriverAssigned);
    }

    #[tokio::test]
    async fn test_expire_cancels_pending_ride() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();

        let expired = lifecycle.expire(&ride).await.unwrap();
        assert!(expired);

        let ride = Ride::find_by_id(&pool, &ride.id).await.unwrap().unwrap();
        assert_eq!(ride.get_status(), RideStatus::Cancelled);
        assert_eq!(ride.cancelled_by.as_deref(), Some("system"));
    }

    #[tokio::test]
    async fn test_location_fix_lands_in_active_ride_stream() {
        let (pool, lifecycle) = setup().await;
        let passenger = insert_user(&pool, "p1", "passenger", "active").await;
        let driver = insert_user(&pool, "d1", "driver", "verified").await;

        let ride = lifecycle.create_ride(&passenger, &ride_request()).await.unwrap();
        let offer = lifecycle
            .make_offer(&driver, &ride.id, &MakeOfferRequest { kind: OfferKind::Accept, amount: None })
            .await
            .unwrap();
        lifecycle.select_offer(&passenger, &ride.id, &offer.id).await.unwrap();

        lifecycle.record_location(&driver, 52.53, 13.41).await.unwrap();

        let events = RideEvent::list_after(&pool, &ride.id, 0).await.unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.event_type, "location_updated");
        let payload: serde_json::Value = serde_json::from_str(&last.payload).unwrap();
        assert_eq!(payload["latitude"], 52.53);

        // The fix is also on the user row
        let driver = User::find_by_id(&pool, "d1").await.unwrap().unwrap();
        assert_eq!(driver.last_latitude, Some(52.53));
        assert_eq!(driver.online, 1);
    }
}
