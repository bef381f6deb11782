use super::types::RunEvent;
use tokio::sync::broadcast;

/// Broadcast-based event bus for run progress.
///
/// Uses `tokio::broadcast` so multiple subscribers can receive the same events.
/// Slow subscribers miss events (lagged) rather than blocking the orchestrator.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns how many subscribers received it.
    pub fn publish(&self, event: RunEvent) -> usize {
        // No receivers is not an error
        self.sender.send(event).unwrap_or(0)
    }

    /// Current number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
