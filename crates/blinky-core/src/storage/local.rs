//! Device-local section store
//!
//! The whole collection is one JSON array under the `sections` key. A payload
//! that fails to parse is treated as an empty collection. Writes through the
//! `SectionBackend` interface never fail the caller: a rejected write is
//! logged and dropped, the same way a browser quota error would be.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::error::{StorageError, StorageResult};
use super::persistence::KeyValueMedium;
use super::SectionBackend;
use crate::config::{backup_key, BACKUP_KEY_PREFIX, SECTIONS_KEY};
use crate::models::{now_millis, Section};

/// Section collection persisted in a local key-value medium
#[derive(Clone)]
pub struct LocalStore {
    medium: Arc<dyn KeyValueMedium>,
}

impl LocalStore {
    pub fn new(medium: Arc<dyn KeyValueMedium>) -> Self {
        Self { medium }
    }

    /// Read the collection
    ///
    /// Missing or malformed payloads yield an empty collection. I/O failures
    /// other than "not found" are returned.
    pub fn load(&self) -> StorageResult<Vec<Section>> {
        let Some(raw) = self.medium.get(SECTIONS_KEY)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<Section>>(&raw) {
            Ok(sections) => Ok(sections),
            Err(e) => {
                warn!("Discarding malformed local sections payload: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Overwrite the collection, reporting failures to the caller
    pub fn write(&self, sections: &[Section]) -> StorageResult<()> {
        let json = serde_json::to_string(sections)?;
        self.medium.set(SECTIONS_KEY, &json)
    }

    /// Write an immutable snapshot under a timestamped key
    ///
    /// Returns the key used. An existing snapshot is never overwritten; if
    /// two backups land in the same millisecond the later one takes the next
    /// free timestamp.
    pub fn backup(&self, sections: &[Section]) -> StorageResult<String> {
        let json = serde_json::to_string(sections)?;
        let mut ts = now_millis();
        let mut key = backup_key(ts);
        while self.medium.get(&key)?.is_some() {
            ts += 1;
            key = backup_key(ts);
        }
        self.medium.set(&key, &json)?;
        debug!("Backed up {} local section(s) to {}", sections.len(), key);
        Ok(key)
    }

    /// Keys of all backup snapshots, oldest first
    pub fn backups(&self) -> StorageResult<Vec<String>> {
        let mut keys = self.medium.keys(BACKUP_KEY_PREFIX)?;
        // Numeric order, not lexical
        keys.sort_by_key(|k| {
            k.trim_start_matches(BACKUP_KEY_PREFIX)
                .parse::<i64>()
                .unwrap_or(i64::MAX)
        });
        Ok(keys)
    }

    /// Read a backup snapshot for manual recovery
    pub fn read_backup(&self, key: &str) -> StorageResult<Vec<Section>> {
        match self.medium.get(key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(StorageError::NotFound { path: key.into() }),
        }
    }
}

#[async_trait]
impl SectionBackend for LocalStore {
    async fn get(&self) -> StorageResult<Vec<Section>> {
        self.load()
    }

    async fn set(&self, sections: &[Section]) -> StorageResult<()> {
        if let Err(e) = self.write(sections) {
            error!("Failed to write local sections: {}", e);
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.medium.remove(SECTIONS_KEY)
    }
}
