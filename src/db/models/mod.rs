//! Database models split into domain-specific modules.

pub mod kyc;
pub mod message;
pub mod notification;
pub mod offer;
pub mod pricing;
pub mod ride;
pub mod ride_event;
pub mod user;
pub mod vehicle;

pub use kyc::*;
pub use message::*;
pub use notification::*;
pub use offer::*;
pub use pricing::*;
pub use ride::*;
pub use ride_event::*;
pub use user::*;
pub use vehicle::*;
