use tokio::sync::broadcast;

pub mod messages;

// Re-export the core types to provide a clean public API.
pub use messages::GameEvent;

/// In-process publish/subscribe for round lifecycle and leaderboard events.
///
/// Fan-out is non-blocking: a publish never waits on subscribers, and a
/// subscriber that falls behind loses its oldest events (buffering is the
/// subscriber's concern). The external push layer subscribes once and relays
/// to its own clients.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GameEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all current subscribers. An event with no
    /// subscribers is silently dropped.
    pub fn publish(&self, event: GameEvent) {
        tracing::debug!(event_type = ?event, "publishing event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
