//! Ride dispatch: fare calculation, geospatial queries, the ride
//! lifecycle state machine, and the background sweeper.

pub mod expiry;
pub mod fare;
pub mod geo;
pub mod lifecycle;

pub use expiry::{spawn_sweeper, Sweeper};
pub use fare::{calculate_fare, FareBreakdown};
pub use geo::{board_entries, haversine_km, nearby_drivers, pickup_distance_km};
pub use lifecycle::{LifecycleError, RideLifecycle, MIN_REASON_LEN};
