//! Configuration module for autobackup
//!
//! This module provides configuration management including:
//! - Data directory resolution
//! - The persisted backup document (settings, history, migration)

pub mod paths;
pub mod settings;

pub use paths::BackupPaths;
pub use settings::{
    migrate_document, BackupConfig, BackupDocument, BackupRuntimeState, SettingsUpdate,
};
