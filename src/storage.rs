use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs;

use crate::error::{FinderError, FinderResult};

/// Durable key-value storage for small named records.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, key: &str) -> FinderResult<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> FinderResult<()>;
}

/// Stores each record as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn load(&self, key: &str) -> FinderResult<Option<String>> {
        let path = self.record_path(key);
        match fs::read_to_string(&path).await {
            Ok(contents) => {
                debug!("Loaded record {} from {}", key, path.display());
                Ok(Some(contents))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No stored record at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(FinderError::Storage(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn save(&self, key: &str, value: &str) -> FinderResult<()> {
        fs::create_dir_all(&self.dir).await?;

        // Write then rename so a crash never leaves a half-written record
        let path = self.record_path(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, value).await?;
        fs::rename(&tmp_path, &path).await?;

        debug!("Saved record {} to {}", key, path.display());
        Ok(())
    }
}

/// In-process store, used when no data directory is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> FinderResult<Option<String>> {
        let records = self
            .records
            .lock()
            .map_err(|_| FinderError::Storage("Failed to acquire store lock".into()))?;
        Ok(records.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> FinderResult<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| FinderError::Storage("Failed to acquire store lock".into()))?;
        records.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
