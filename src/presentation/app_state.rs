// Application state for HTTP handlers
use crate::application::recorder_service::RecorderService;
use crate::infrastructure::broadcast_sink::BroadcastSink;
use crate::infrastructure::live_source::LiveReadings;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub service: RecorderService,
    pub events: Arc<BroadcastSink>,
    /// Present when readings are pushed over HTTP instead of polled.
    pub live_source: Option<Arc<LiveReadings>>,
    pub shutdown: watch::Receiver<bool>,
}
