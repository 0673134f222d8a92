use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::models::kiosk::KioskEvent;
use crate::models::LocationId;

/// Per-location fan-out of kiosk events.
///
/// Channels are created on first subscription. Publishing to a location
/// nobody listens to is a no-op.
pub struct KioskEvents {
    channels: DashMap<LocationId, broadcast::Sender<KioskEvent>>,
    capacity: usize,
}

impl KioskEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    pub fn subscribe(&self, location_id: LocationId) -> broadcast::Receiver<KioskEvent> {
        self.channels
            .entry(location_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send an event to every kiosk of the location, returning how many
    /// subscribers received it
    pub fn publish(&self, location_id: LocationId, event: KioskEvent) -> usize {
        match self.channels.get(&location_id) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscriber_count(&self, location_id: LocationId) -> usize {
        self.channels
            .get(&location_id)
            .map_or(0, |sender| sender.receiver_count())
    }
}
