//! Storage layer for autobackup
//!
//! Backups are opaque text blobs kept by a [`StorageBackend`]. Two variants
//! exist:
//!
//! - [`FileBackend`]: one file per backup in a directory
//! - [`KeyValueBackend`]: entries in an embedded key-value store
//!
//! The variant is chosen once, by [`select_backend`], from the
//! [`HostEnvironment`]. Everything above this module talks to the trait only.

pub mod file;
pub mod file_io;
pub mod kv;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::backup::BackupRecord;
use crate::config::paths::BackupPaths;
use crate::config::settings::BackupConfig;
use crate::error::BackupResult;

pub use file::FileBackend;
pub use file_io::{read_json, read_json_required, write_json_atomic};
pub use kv::KeyValueBackend;

/// Which storage variant is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    File,
    KeyValue,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::File => write!(f, "file"),
            BackendKind::KeyValue => write!(f, "key-value"),
        }
    }
}

/// Durable blob storage for backups
///
/// A missing blob is reported as [`crate::BackupError::NotFound`]; every
/// other failure as [`crate::BackupError::Storage`].
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// The variant
    fn kind(&self) -> BackendKind;

    /// Human-readable location (directory or store path)
    fn location(&self) -> String;

    /// Storage key for a record
    fn key_for(&self, record: &BackupRecord) -> String;

    /// Create the container if needed. Idempotent.
    async fn ensure_container(&self) -> BackupResult<()>;

    /// Store `content` under `key`, replacing any previous blob
    async fn write(&self, key: &str, content: &str) -> BackupResult<()>;

    /// Load the blob stored under `key`
    async fn read(&self, key: &str) -> BackupResult<String>;

    /// Remove the blob stored under `key`
    async fn delete(&self, key: &str) -> BackupResult<()>;

    /// Keys of all backup blobs in the container, sorted
    async fn list(&self) -> BackupResult<Vec<String>>;
}

/// Capabilities of the host the engine runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEnvironment {
    /// Whether the host exposes a native filesystem
    pub native_fs: bool,
}

impl HostEnvironment {
    /// Detect the host; `AUTOBACKUP_BACKEND=kv` disables filesystem backups
    pub fn detect() -> Self {
        let forced_kv = std::env::var("AUTOBACKUP_BACKEND")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "kv" | "key-value"))
            .unwrap_or(false);
        Self {
            native_fs: !forced_kv,
        }
    }
}

/// Choose the storage backend for this process
pub fn select_backend(
    host: HostEnvironment,
    config: &BackupConfig,
    paths: &BackupPaths,
) -> Arc<dyn StorageBackend> {
    let backend: Arc<dyn StorageBackend> = if host.native_fs {
        let dir = paths.backup_dir(config.backup_path.as_deref());
        Arc::new(FileBackend::new(dir))
    } else {
        Arc::new(KeyValueBackend::open(paths.kv_store_file()))
    };

    info!(
        backend = %backend.kind(),
        location = %backend.location(),
        "selected backup storage backend"
    );
    backend
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_select_backend_by_host() {
        let temp_dir = TempDir::new().unwrap();
        let paths = BackupPaths::with_base_dir(temp_dir.path().to_path_buf());
        let config = BackupConfig::default();

        let file = select_backend(HostEnvironment { native_fs: true }, &config, &paths);
        assert_eq!(file.kind(), BackendKind::File);
        assert_eq!(
            file.location(),
            paths.default_backup_dir().display().to_string()
        );

        let kv = select_backend(HostEnvironment { native_fs: false }, &config, &paths);
        assert_eq!(kv.kind(), BackendKind::KeyValue);
    }

    #[test]
    fn test_select_backend_honors_override() {
        let temp_dir = TempDir::new().unwrap();
        let paths = BackupPaths::with_base_dir(temp_dir.path().to_path_buf());
        let custom = temp_dir.path().join("custom");
        let config = BackupConfig {
            backup_path: Some(custom.display().to_string()),
            ..BackupConfig::default()
        };

        let backend = select_backend(HostEnvironment { native_fs: true }, &config, &paths);
        assert_eq!(backend.location(), custom.display().to_string());
    }
}
