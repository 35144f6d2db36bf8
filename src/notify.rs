use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub publishing every applied event, per office. Notification
/// and calendar-sync collaborators subscribe here.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events of an office. Creates the channel if needed.
    pub fn subscribe(&self, office_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(office_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, office_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&office_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop an office's channel once the office is gone.
    pub fn remove(&self, office_id: &Ulid) {
        self.channels.remove(office_id);
    }
}
