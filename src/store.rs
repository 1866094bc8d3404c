use std::{
    collections::{BTreeMap, HashMap},
    io::ErrorKind,
    path::PathBuf,
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use crate::config::store_path_capsule;

/// Key under which the serialized link list is kept.
pub const LINKS_KEY: &str = "shortenedUrls";

pub fn key_value_store_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn KeyValueStore> {
    let path = get.as_ref(store_path_capsule).clone();
    Arc::new(JsonFileStore::new(path))
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read from store: {0:#}")]
    Read(anyhow::Error),
    #[error("failed to write to store: {0:#}")]
    Write(anyhow::Error),
}

/// String key-value storage; every `set` replaces the whole value.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn with_entry(key: &str, value: impl Into<String>) -> Self {
        Self {
            entries: RwLock::new(HashMap::from([(key.to_owned(), value.into())])),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_owned(), value);
        Ok(())
    }
}

/// Keeps all entries as one JSON object in a single file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns [`None`] when the file does not exist yet.
    async fn read_contents(&self) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Store file does not exist yet");
                Ok(None)
            }
            Err(err) => {
                Err(err).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        }
    }

    fn parse_entries(&self, contents: &str) -> anyhow::Result<BTreeMap<String, String>> {
        serde_json::from_str(contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(contents) = self.read_contents().await.map_err(StoreError::Read)? else {
            return Ok(None);
        };
        let mut entries = self.parse_entries(&contents).map_err(StoreError::Read)?;
        Ok(entries.remove(key))
    }

    #[instrument(skip(self, value), fields(path = %self.path.display()))]
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        // NOTE: only unparseable contents are replaced; a failed read leaves the file alone
        let mut entries = match self.read_contents().await.map_err(StoreError::Write)? {
            None => BTreeMap::new(),
            Some(contents) => self.parse_entries(&contents).unwrap_or_else(|err| {
                warn!(?err, "Replacing unparseable store file");
                BTreeMap::new()
            }),
        };
        entries.insert(key.to_owned(), value);

        let serialized = serde_json::to_string_pretty(&entries)
            .context("Failed to serialize store entries")
            .map_err(StoreError::Write)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, serialized)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))
            .map_err(StoreError::Write)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))
            .map_err(StoreError::Write)
    }
}
