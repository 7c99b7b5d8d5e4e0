//! File-backed backup storage
//!
//! Each backup is a file named by its key inside one directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::backup::record::FILE_NAME_PREFIX;
use crate::backup::BackupRecord;
use crate::error::{BackupError, BackupResult};

use super::{BackendKind, StorageBackend};

/// Stores backups as files in a directory
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `dir`; nothing is touched until used
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// The backup directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> BackupResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(BackupError::Storage(format!("Invalid backup key: {:?}", key)));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn key_for(&self, record: &BackupRecord) -> String {
        record.file_name.clone()
    }

    async fn ensure_container(&self) -> BackupResult<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            BackupError::Storage(format!(
                "Failed to create backup directory {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    async fn write(&self, key: &str, content: &str) -> BackupResult<()> {
        let path = self.path_for(key)?;
        let temp_path = path.with_extension("json.tmp");

        fs::write(&temp_path, content).await.map_err(|e| {
            BackupError::Storage(format!("Failed to write backup file {}: {}", key, e))
        })?;

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(BackupError::Storage(format!(
                "Failed to move backup file {} into place: {}",
                key, e
            )));
        }

        Ok(())
    }

    async fn read(&self, key: &str) -> BackupResult<String> {
        let path = self.path_for(key)?;
        fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => BackupError::backup_not_found(key),
            _ => BackupError::Storage(format!("Failed to read backup file {}: {}", key, e)),
        })
    }

    async fn delete(&self, key: &str) -> BackupResult<()> {
        let path = self.path_for(key)?;
        fs::remove_file(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => BackupError::backup_not_found(key),
            _ => BackupError::Storage(format!("Failed to delete backup file {}: {}", key, e)),
        })
    }

    async fn list(&self) -> BackupResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BackupError::Storage(format!(
                    "Failed to read backup directory: {}",
                    e
                )))
            }
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            BackupError::Storage(format!("Failed to read directory entry: {}", e))
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(FILE_NAME_PREFIX) && name.ends_with(".json") {
                keys.push(name);
            }
        }

        keys.sort();
        Ok(keys)
    }
}
