//! Key-value backed backup storage
//!
//! Backups are entries keyed `autobackup-<id>` in a small embedded store.
//! The store is one JSON map document rewritten atomically on every change,
//! or kept purely in memory when opened with [`KeyValueBackend::in_memory`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backup::BackupRecord;
use crate::error::{BackupError, BackupResult};

use super::file_io::{read_json, write_json_atomic};
use super::{BackendKind, StorageBackend};

/// Prefix of every backup key
pub const KEY_PREFIX: &str = "autobackup-";

type Entries = BTreeMap<String, String>;

/// Stores backups as entries in an embedded key-value store
#[derive(Debug)]
pub struct KeyValueBackend {
    /// Store document; `None` keeps entries in memory only
    path: Option<PathBuf>,
    /// Loaded lazily on first use
    entries: Mutex<Option<Entries>>,
}

impl KeyValueBackend {
    /// Open (lazily) the store document at `path`
    pub fn open(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            entries: Mutex::new(None),
        }
    }

    /// A store that lives only as long as this value
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Some(Entries::new())),
        }
    }

    async fn load(&self, slot: &mut Option<Entries>) -> BackupResult<()> {
        if slot.is_some() {
            return Ok(());
        }
        let entries = match &self.path {
            Some(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || read_json::<Entries, _>(path))
                    .await
                    .map_err(|e| BackupError::Storage(format!("Key-value load task failed: {}", e)))??
            }
            None => Entries::new(),
        };
        *slot = Some(entries);
        Ok(())
    }

    async fn persist(&self, entries: &Entries) -> BackupResult<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let snapshot = entries.clone();
        tokio::task::spawn_blocking(move || write_json_atomic(path, &snapshot))
            .await
            .map_err(|e| BackupError::Storage(format!("Key-value save task failed: {}", e)))?
    }
}

#[async_trait]
impl StorageBackend for KeyValueBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    fn location(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "memory".to_string(),
        }
    }

    fn key_for(&self, record: &BackupRecord) -> String {
        format!("{}{}", KEY_PREFIX, record.id)
    }

    async fn ensure_container(&self) -> BackupResult<()> {
        let mut slot = self.entries.lock().await;
        self.load(&mut slot).await
    }

    async fn write(&self, key: &str, content: &str) -> BackupResult<()> {
        let mut slot = self.entries.lock().await;
        self.load(&mut slot).await?;
        let Some(entries) = slot.as_mut() else {
            return Err(BackupError::Storage("Key-value store not loaded".into()));
        };

        let previous = entries.insert(key.to_string(), content.to_string());
        if let Err(e) = self.persist(entries).await {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn read(&self, key: &str) -> BackupResult<String> {
        let mut slot = self.entries.lock().await;
        self.load(&mut slot).await?;
        slot.as_ref()
            .and_then(|entries| entries.get(key).cloned())
            .ok_or_else(|| BackupError::backup_not_found(key))
    }

    async fn delete(&self, key: &str) -> BackupResult<()> {
        let mut slot = self.entries.lock().await;
        self.load(&mut slot).await?;
        let Some(entries) = slot.as_mut() else {
            return Err(BackupError::Storage("Key-value store not loaded".into()));
        };

        let Some(old) = entries.remove(key) else {
            return Err(BackupError::backup_not_found(key));
        };
        if let Err(e) = self.persist(entries).await {
            entries.insert(key.to_string(), old);
            return Err(e);
        }
        Ok(())
    }

    async fn list(&self) -> BackupResult<Vec<String>> {
        let mut slot = self.entries.lock().await;
        self.load(&mut slot).await?;
        Ok(slot
            .as_ref()
            .map(|entries| {
                entries
                    .keys()
                    .filter(|k| k.starts_with(KEY_PREFIX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
