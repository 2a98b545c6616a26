// Server-sent event stream of recorder events
use crate::domain::events::RecorderEvent;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

fn to_sse(event: &RecorderEvent) -> Option<Event> {
    match Event::default().event(event.name()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            tracing::error!("Failed to encode {} event: {}", event.name(), e);
            None
        }
    }
}

/// Streams events from a broadcast subscription until the sink goes away or
/// shutdown is signalled.
pub fn sse_from_receiver(
    mut rx: broadcast::Receiver<RecorderEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> impl IntoResponse {
    let stream = async_stream::stream! {
        loop {
            let received = tokio::select! {
                received = rx.recv() => received,
                _ = shutdown.changed() => break,
            };
            match received {
                Ok(event) => {
                    if let Some(sse) = to_sse(&event) {
                        yield Ok::<Event, Infallible>(sse);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Event subscriber lagged, {} events dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
