use std::{collections::HashSet, sync::Arc};

use anyhow::Context;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::{
    events::{EventSink, LinkEvent},
    link::LinkRecord,
    shortcode::{Shortcode, ShortcodeError},
    store::{KeyValueStore, LINKS_KEY, StoreError},
};

/// Every link created so far, in creation order, written through to a
/// [`KeyValueStore`] after each append.
pub struct LinkRegistry {
    records: RwLock<Vec<LinkRecord>>,
    store: Arc<dyn KeyValueStore>,
    events: Arc<dyn EventSink>,
}

impl LinkRegistry {
    /// Reads the stored links. Missing or malformed data yields an empty
    /// registry rather than an error.
    #[instrument(skip_all)]
    pub async fn load(store: Arc<dyn KeyValueStore>, events: Arc<dyn EventSink>) -> Self {
        let records = match read_records(store.as_ref()).await {
            Ok(records) => {
                info!(count = records.len(), "Loaded links from store");
                events.emit(&LinkEvent::UrlsLoaded {
                    count: records.len(),
                });
                records
            }
            Err(err) => {
                warn!(?err, "Failed to load links; starting with an empty registry");
                events.emit(&LinkEvent::LoadError {
                    error: err.to_string(),
                });
                Vec::new()
            }
        };

        Self {
            records: RwLock::new(records),
            store,
            events,
        }
    }

    pub async fn snapshot_codes(&self) -> HashSet<Shortcode> {
        self.records
            .read()
            .await
            .iter()
            .map(|record| record.shortcode().clone())
            .collect()
    }

    pub async fn all(&self) -> Vec<LinkRecord> {
        self.records.read().await.clone()
    }

    pub async fn find(&self, shortcode: &str) -> Option<LinkRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| record.shortcode().as_str() == shortcode)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Adds `record` without checking its shortcode; callers resolve
    /// uniqueness beforehand.
    #[instrument(skip_all, fields(shortcode = %record.shortcode()))]
    pub async fn append(&self, record: LinkRecord) {
        let mut records = self.records.write().await;
        self.push_and_persist(&mut records, record).await;
    }

    /// Like [`Self::append`], but re-checks the shortcode while holding the
    /// registry lock.
    ///
    /// # Errors
    /// Returns [`ShortcodeError::Collision`] if another record took the
    /// shortcode in the meantime.
    #[instrument(skip_all, fields(shortcode = %record.shortcode()))]
    pub async fn append_unique(&self, record: LinkRecord) -> Result<(), ShortcodeError> {
        let mut records = self.records.write().await;
        if records
            .iter()
            .any(|existing| existing.shortcode() == record.shortcode())
        {
            self.events.emit(&LinkEvent::ShortcodeCollision {
                preferred_shortcode: record.shortcode().clone(),
            });
            return Err(ShortcodeError::Collision(record.shortcode().clone()));
        }
        self.push_and_persist(&mut records, record).await;
        Ok(())
    }

    // NOTE: the write guard is held across the store write so that saves land in append order
    async fn push_and_persist(&self, records: &mut Vec<LinkRecord>, record: LinkRecord) {
        self.events.emit(&LinkEvent::ShortenedUrlAdded {
            shortcode: record.shortcode().clone(),
        });
        records.push(record);

        match write_records(self.store.as_ref(), records).await {
            Ok(()) => self.events.emit(&LinkEvent::UrlsSaved {
                count: records.len(),
            }),
            Err(err) => {
                warn!(?err, "Failed to save links; keeping them in memory only");
                self.events.emit(&LinkEvent::SaveError {
                    error: err.to_string(),
                });
            }
        }
    }
}

async fn read_records(store: &dyn KeyValueStore) -> Result<Vec<LinkRecord>, StoreError> {
    let Some(serialized) = store.get(LINKS_KEY).await? else {
        return Ok(Vec::new());
    };
    serde_json::from_str(&serialized)
        .context("Stored links are malformed")
        .map_err(StoreError::Read)
}

async fn write_records(store: &dyn KeyValueStore, records: &[LinkRecord]) -> Result<(), StoreError> {
    let serialized = serde_json::to_string(records)
        .context("Failed to serialize links")
        .map_err(StoreError::Write)?;
    store.set(LINKS_KEY, serialized).await
}
