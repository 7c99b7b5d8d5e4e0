//! Automatic backup engine
//!
//! Decides when a backup is due, stores snapshots through a pluggable
//! storage backend, enforces retention, and restores or exports any retained
//! backup.
//!
//! # Architecture
//!
//! - `fingerprint`: cheap change detection over exported state
//! - `record`: `BackupRecord` and backup file naming
//! - `retention`: oldest-first eviction for the count and size ceilings
//! - `store`: `BackupStore`, the orchestrator owning settings and history
//! - `scheduler`: `BackupScheduler`, the periodic background task
//!
//! # Backup Format
//!
//! Each backup is the full serialized application state, a JSON object
//! with three required sections:
//! - `chat-next-web-store`: sessions and messages
//! - `app-config`: application configuration
//! - `access-control`: access settings and credentials
//!
//! File-backed backups are named
//! `AutoBackup-<ISO timestamp with ':' and '.' as '_'>-<id>.json`.
//!
//! # Retention Policy
//!
//! After every backup the oldest backups are evicted until at most
//! `max_backups` remain (1 to 50, default 10). New backups are skipped while
//! retained backups exceed 100 MiB.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use autobackup::app_state::JsonFileAppState;
//! use autobackup::backup::{BackupScheduler, BackupStore};
//! use autobackup::config::{BackupDocument, BackupPaths};
//! use autobackup::storage::{select_backend, HostEnvironment};
//!
//! let paths = BackupPaths::new()?;
//! let document = BackupDocument::load_or_create(&paths.settings_file())?;
//! let backend = select_backend(HostEnvironment::detect(), &document.config, &paths);
//! let app = Arc::new(JsonFileAppState::new(paths.app_state_file()));
//!
//! let store = Arc::new(
//!     BackupStore::new(backend, app.clone(), app, document)
//!         .with_persistence(paths.settings_file()),
//! );
//! let handle = BackupScheduler::new(store.clone()).spawn(shutdown.clone());
//!
//! // Later, restore the most recent backup
//! if let Some(latest) = store.latest_backup().await {
//!     store.restore_backup(&latest.id).await?;
//! }
//! ```

pub mod fingerprint;
pub mod record;
pub mod retention;
pub mod scheduler;
pub mod store;

pub use fingerprint::fingerprint;
pub use record::BackupRecord;
pub use retention::RetentionPolicy;
pub use scheduler::{BackupScheduler, TickOutcome};
pub use store::{
    BackupDecision, BackupEvent, BackupStatus, BackupStore, ExportedBackup, RestoreOutcome,
    RunOutcome,
};
