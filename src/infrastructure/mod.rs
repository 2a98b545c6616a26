// Infrastructure layer - External dependencies and adapters
pub mod broadcast_sink;
pub mod config;
pub mod event_stream;
pub mod json_store;
pub mod live_source;
pub mod polar_import;
pub mod signalk_source;
