// Polar table storage trait
use crate::domain::polar::PolarTable;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid polar file name '{0}'")]
    InvalidFileName(String),
    #[error("polar file '{0}' already exists")]
    AlreadyExists(String),
    #[error("polar file '{file}' is malformed: {source}")]
    Malformed {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid polar import: {0}")]
    InvalidImport(String),
    #[error("I/O error on '{file}': {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait PolarStore: Send + Sync {
    /// Load a table; a file that does not exist yet is an empty table
    async fn load(&self, file: &str) -> Result<PolarTable, StoreError>;

    async fn save(&self, file: &str, table: &PolarTable) -> Result<(), StoreError>;

    /// Names of all stored polar files, sorted
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Create an empty polar file, refusing to overwrite an existing one
    async fn create(&self, file: &str) -> Result<(), StoreError>;
}

/// Polar files are bare `*.json` names inside the data directory.
pub fn is_valid_file_name(name: &str) -> bool {
    name.len() > ".json".len()
        && name.ends_with(".json")
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}
