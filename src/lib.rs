//! autobackup - automatic rolling backups of application state
//!
//! This library decides when the application state has changed enough to
//! be worth a backup, stores full snapshots through a file or key-value
//! backend, enforces retention limits, and restores or exports any retained
//! backup.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Data paths, backup settings and the persisted document
//! - `error`: Custom error types
//! - `storage`: Storage backends and atomic JSON file helpers
//! - `snapshot`: Snapshot validation, statistics and merging
//! - `app_state`: Collaborators that export and replace application state
//! - `backup`: Change detection, retention, the backup store and scheduler
//! - `cli`: Command handlers for the `autobackup` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use autobackup::config::{BackupDocument, BackupPaths};
//!
//! let paths = BackupPaths::new()?;
//! let document = BackupDocument::load_or_create(&paths.settings_file())?;
//! ```

pub mod app_state;
pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod snapshot;
pub mod storage;

pub use error::{BackupError, BackupResult};
