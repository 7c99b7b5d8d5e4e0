//! Path management for autobackup
//!
//! Resolves where the engine keeps its settings document, the default backup
//! directory, the key-value store and the application state file.
//!
//! ## Path Resolution Order
//!
//! 1. `AUTOBACKUP_DATA_DIR` environment variable (if set)
//! 2. The platform data directory from [`directories::ProjectDirs`]
//!    (`~/.local/share/autobackup`, `~/Library/Application Support/autobackup`,
//!    `%APPDATA%\autobackup\data`)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::BackupError;

/// Directory name used for file-backed backups when no override is configured
pub const DEFAULT_BACKUP_DIR_NAME: &str = "AutoBackups";

/// Manages all paths used by autobackup
#[derive(Debug, Clone)]
pub struct BackupPaths {
    /// Application data directory
    base_dir: PathBuf,
}

impl BackupPaths {
    /// Create a new BackupPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no platform data directory can be determined.
    pub fn new() -> Result<Self, BackupError> {
        let base_dir = if let Ok(custom) = std::env::var("AUTOBACKUP_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create BackupPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the application data directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the default backup directory (`<app-data-dir>/AutoBackups`)
    pub fn default_backup_dir(&self) -> PathBuf {
        self.base_dir.join(DEFAULT_BACKUP_DIR_NAME)
    }

    /// Resolve the backup directory, honoring a non-empty override
    pub fn backup_dir(&self, override_path: Option<&str>) -> PathBuf {
        match override_path.map(str::trim) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => self.default_backup_dir(),
        }
    }

    /// Get the path to the persisted settings and history document
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("autobackup.json")
    }

    /// Get the path to the embedded key-value store document
    pub fn kv_store_file(&self) -> PathBuf {
        self.base_dir.join("autobackup-kv.json")
    }

    /// Get the path to the application state file the CLI backs up
    pub fn app_state_file(&self) -> PathBuf {
        self.base_dir.join("state.json")
    }

    /// Ensure the application data directory exists
    pub fn ensure_directories(&self) -> Result<(), BackupError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| BackupError::Io(format!("Failed to create data directory: {}", e)))
    }
}

/// Resolve the default data directory path based on platform
fn resolve_default_path() -> Result<PathBuf, BackupError> {
    ProjectDirs::from("", "", "autobackup")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| BackupError::Config("Could not determine a data directory".into()))
}
