// Application layer - Recording pipeline and its collaborator ports
pub mod notifier;
pub mod polar_store;
pub mod reading_source;
pub mod recorder;
pub mod recorder_service;
