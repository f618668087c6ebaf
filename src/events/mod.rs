//! In-process per-ride event broadcast.
//!
//! Subscribers replay the persisted backlog from `ride_events` and then
//! follow the live channel, so a publish with no subscribers is safe to
//! drop. Channels are removed once a terminal event is published.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::db::RideEvent;

/// Buffered events per ride channel. A subscriber that lags past this
/// observes a `Lagged` error and should resync from the database.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
pub struct RideEventBus {
    channels: DashMap<String, broadcast::Sender<RideEvent>>,
}

impl RideEventBus {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a ride's live events, creating the channel on demand
    pub fn subscribe(&self, ride_id: &str) -> broadcast::Receiver<RideEvent> {
        self.channels
            .entry(ride_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a persisted event to live subscribers. Terminal events tear
    /// the channel down after delivery.
    pub fn publish(&self, event: &RideEvent) {
        let terminal = event
            .get_event_type()
            .map(|t| t.is_terminal())
            .unwrap_or(false);

        if let Some(tx) = self.channels.get(&event.ride_id) {
            // Send fails only when no receiver is subscribed
            let _ = tx.send(event.clone());
        }

        if terminal {
            self.channels.remove(&event.ride_id);
        }
    }

    /// Number of rides with an open channel
    pub fn open_channels(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RideEventType;

    fn event(ride_id: &str, seq: i64, event_type: RideEventType) -> RideEvent {
        RideEvent {
            id: seq,
            ride_id: ride_id.to_string(),
            seq,
            event_type: event_type.as_str().to_string(),
            payload: "{}".to_string(),
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_then_publish() {
        let bus = RideEventBus::new();
        let mut rx = bus.subscribe("ride-1");

        bus.publish(&event("ride-1", 1, RideEventType::RideCreated));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.seq, 1);
        assert_eq!(received.event_type, "ride_created");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = RideEventBus::new();
        // No channel exists yet, publish must not panic or allocate one
        bus.publish(&event("ride-1", 1, RideEventType::RideCreated));
        assert_eq!(bus.open_channels(), 0);
    }

    #[tokio::test]
    async fn test_terminal_event_closes_channel() {
        let bus = RideEventBus::new();
        let mut rx = bus.subscribe("ride-1");
        assert_eq!(bus.open_channels(), 1);

        bus.publish(&event("ride-1", 5, RideEventType::RideCompleted));
        assert_eq!(bus.open_channels(), 0);

        // The buffered terminal event is still delivered before closure
        let received = rx.recv().await.unwrap();
        assert_eq!(received.seq, 5);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_channels_are_isolated_per_ride() {
        let bus = RideEventBus::new();
        let mut rx_a = bus.subscribe("ride-a");
        let _rx_b = bus.subscribe("ride-b");

        bus.publish(&event("ride-b", 1, RideEventType::OfferMade));
        // ride-a subscriber sees nothing
        assert!(matches!(
            rx_a.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
