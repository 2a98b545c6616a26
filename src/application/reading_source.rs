// Reading source trait for sensor bus access
use crate::domain::readings::{PropulsionStatus, Reading};
use async_trait::async_trait;

#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Latest value at a Signal K path, `None` when the path has no value
    async fn reading(&self, path: &str) -> anyhow::Result<Option<Reading>>;

    /// Current state of every propulsion instance
    async fn propulsion(&self) -> anyhow::Result<Vec<PropulsionStatus>>;

    /// Resolves when propulsion data may have changed
    async fn propulsion_changed(&self);
}
