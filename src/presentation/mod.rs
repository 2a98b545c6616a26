// Presentation layer - HTTP routes over the recorder service
pub mod app_state;
pub mod handlers;
