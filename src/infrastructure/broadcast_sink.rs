// Broadcast notification sink
use crate::application::notifier::NotificationSink;
use crate::domain::events::RecorderEvent;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 256;

/// Fans events out to every connected subscriber. Publishing never blocks;
/// subscribers that fall behind lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<RecorderEvent>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for BroadcastSink {
    fn publish(&self, event: RecorderEvent) {
        tracing::debug!("Publishing {}", event.name());
        // no subscribers is not an error
        let _ = self.tx.send(event);
    }
}
