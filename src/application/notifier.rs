// Notification sink trait for pushing state changes to clients
use crate::domain::events::RecorderEvent;

pub trait NotificationSink: Send + Sync {
    /// Fire-and-forget; delivery failures are the sink's concern
    fn publish(&self, event: RecorderEvent);
}
