//! Core notifications.
//!
//! Components publish [`CoreEvent`]s on a broadcast channel; listeners
//! (the `watch` command's output, a future UI) subscribe as they please.
//! Publishing with nobody subscribed is not an error.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::model::{EntryId, EntryKind};

/// Buffered events per subscriber before the slowest one starts lagging.
pub const DEFAULT_CAPACITY: usize = 64;

/// Something listeners may want to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    EntryAdded { id: EntryId, kind: EntryKind },
    SyncCompleted { success: bool, message: String },
    HistoryCleared { removed: usize },
}

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Send to every current subscriber. Returns how many received it.
    pub fn publish(&self, event: CoreEvent) -> usize {
        trace!(?event, "Publishing event");
        self.tx.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_listeners_is_dropped() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(CoreEvent::HistoryCleared { removed: 3 }), 0);
    }

    #[test]
    fn test_subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(CoreEvent::EntryAdded {
            id: 1,
            kind: EntryKind::Text,
        });
        bus.publish(CoreEvent::SyncCompleted {
            success: true,
            message: "ok".into(),
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            CoreEvent::EntryAdded {
                id: 1,
                kind: EntryKind::Text
            }
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            CoreEvent::SyncCompleted { success: true, .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(CoreEvent::EntryAdded {
            id: 7,
            kind: EntryKind::Image,
        })
        .unwrap();
        assert_eq!(json["event"], "entry_added");
        assert_eq!(json["kind"], "image");
    }
}
