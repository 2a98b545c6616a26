// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post, put},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::reading_source::ReadingSource;
use crate::application::recorder_service::RecorderService;
use crate::infrastructure::broadcast_sink::BroadcastSink;
use crate::infrastructure::config::{RecorderConfig, SourceKind, load_recorder_config};
use crate::infrastructure::json_store::JsonFileStore;
use crate::infrastructure::live_source::LiveReadings;
use crate::infrastructure::signalk_source::SignalKSource;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers;

fn build_source(
    config: &RecorderConfig,
) -> anyhow::Result<(Arc<dyn ReadingSource>, Option<Arc<LiveReadings>>)> {
    match config.source.kind {
        SourceKind::SignalK => {
            tracing::info!("Polling Signal K at {}", config.source.signalk_url);
            let source = SignalKSource::new(
                &config.source.signalk_url,
                config.source.token.clone(),
                std::time::Duration::from_millis(config.source.request_timeout_ms),
                std::time::Duration::from_millis(config.source.propulsion_poll_ms),
            )?;
            let source: Arc<dyn ReadingSource> = Arc::new(source);
            Ok((source, None))
        }
        SourceKind::Push => {
            tracing::info!("Accepting pushed readings on POST /api/readings");
            let live = Arc::new(LiveReadings::new());
            let source: Arc<dyn ReadingSource> = live.clone();
            Ok((source, Some(live)))
        }
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/api/polar-data", get(handlers::polar_data))
        .route("/api/polar-files", get(handlers::polar_files))
        .route("/api/start-recording", post(handlers::start_recording))
        .route("/api/stop-recording", post(handlers::stop_recording))
        .route("/api/recording-mode", put(handlers::set_recording_mode))
        .route("/api/recording", get(handlers::recording))
        .route("/api/motoring", get(handlers::motoring))
        .route("/api/live-data", get(handlers::live_data))
        .route("/api/compare-performance", get(handlers::compare_performance))
        .route("/api/create-polar-file", post(handlers::create_polar_file))
        .route("/api/import-polar", post(handlers::import_polar))
        .route("/api/readings", post(handlers::push_readings))
        .route("/api/events", get(handlers::events))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_recorder_config().context("Invalid recorder configuration")?;

    // Adapters (infrastructure layer)
    let (source, live_source) = build_source(&config)?;
    let store = Arc::new(JsonFileStore::new(config.storage.data_dir.clone()));
    let events = Arc::new(BroadcastSink::new());
    tracing::info!("Polar files in {}", store.dir().display());

    // Recorder (application layer)
    let service = RecorderService::initialize(&config, source, store, events.clone()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampler = {
        let service = service.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { service.run_sampler(shutdown).await })
    };
    let watcher = {
        let service = service.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { service.watch_propulsion(shutdown).await })
    };

    let state = Arc::new(AppState {
        service: service.clone(),
        events,
        live_source,
        shutdown: shutdown_rx,
    });

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid server.bind address '{}'", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Starting polar-recorder on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
            // also ends open event streams so the server can drain
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = tokio::join!(sampler, watcher);
    service.flush().await;
    Ok(())
}
