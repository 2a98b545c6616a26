// JSON file polar store
use crate::application::polar_store::{PolarStore, StoreError, is_valid_file_name};
use crate::domain::polar::PolarTable;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Stores each polar table as a pretty-printed JSON document in `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> Result<PathBuf, StoreError> {
        if is_valid_file_name(file) {
            Ok(self.dir.join(file))
        } else {
            Err(StoreError::InvalidFileName(file.to_string()))
        }
    }

    async fn ensure_dir(&self, file: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_error(file, source))
    }
}

fn io_error(file: &str, source: std::io::Error) -> StoreError {
    StoreError::Io {
        file: file.to_string(),
        source,
    }
}

#[async_trait]
impl PolarStore for JsonFileStore {
    async fn load(&self, file: &str) -> Result<PolarTable, StoreError> {
        let path = self.path(file)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} does not exist yet, starting empty", path.display());
                return Ok(PolarTable::new());
            }
            Err(e) => return Err(io_error(file, e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
            file: file.to_string(),
            source,
        })
    }

    /// Writes to a hidden temp file and renames it over the target, so a
    /// crash mid-write leaves the previous table intact.
    async fn save(&self, file: &str, table: &PolarTable) -> Result<(), StoreError> {
        let path = self.path(file)?;
        self.ensure_dir(file).await?;

        let json = serde_json::to_vec_pretty(table).map_err(|e| io_error(file, e.into()))?;
        let tmp = self.dir.join(format!(".{file}.tmp"));
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| io_error(file, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(file, e))?;

        tracing::debug!("Saved {} cells to {}", table.len(), path.display());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir.display().to_string(), e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir.display().to_string(), e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if is_file && is_valid_file_name(&name) {
                files.push(name);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn create(&self, file: &str) -> Result<(), StoreError> {
        let path = self.path(file)?;
        self.ensure_dir(file).await?;

        let mut handle = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StoreError::AlreadyExists(file.to_string()),
                _ => io_error(file, e),
            })?;
        handle
            .write_all(b"{}\n")
            .await
            .map_err(|e| io_error(file, e))?;
        handle.flush().await.map_err(|e| io_error(file, e))?;
        Ok(())
    }
}
