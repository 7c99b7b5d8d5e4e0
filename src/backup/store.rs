//! Backup store: the orchestrator behind every backup operation
//!
//! [`BackupStore`] owns the configuration and the backup history. It is
//! constructed once at startup and shared (behind an `Arc`) with the
//! scheduler and with every caller. All state sits behind one async mutex
//! that each operation holds for its whole duration, so at most one backup is
//! ever being written, and restores never overlap creation or rotation.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::app_state::{StateExporter, StateMerger};
use crate::config::settings::{
    BackupConfig, BackupDocument, BackupRuntimeState, SettingsUpdate, MAX_TOTAL_SIZE_BYTES,
};
use crate::error::{BackupError, BackupResult};
use crate::snapshot::{self, ExportedState};
use crate::storage::{BackendKind, StorageBackend};

use super::fingerprint::fingerprint;
use super::record::{backup_file_name, new_backup_id, BackupRecord};
use super::retention::RetentionPolicy;

/// Time source, replaceable for tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Why a backup is, or is not, due
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupDecision {
    /// Interval elapsed and the state changed
    Due,
    /// Less than the configured interval since the last backup
    IntervalNotElapsed { remaining_ms: i64 },
    /// Interval elapsed but the fingerprint matches the last backup
    Unchanged,
    /// Retained backups already exceed the size ceiling
    SizeLimitExceeded { total_size: u64, limit: u64 },
    /// The state could not be exported for fingerprinting
    ExportFailed(String),
}

impl BackupDecision {
    pub fn is_due(&self) -> bool {
        matches!(self, Self::Due)
    }
}

/// Result of [`BackupStore::run_if_due`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Automatic backups are switched off
    Disabled,
    /// Nothing to do this time
    Skipped(BackupDecision),
    /// A backup was written
    Created(BackupRecord),
}

/// Notifications published after state-changing operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupEvent {
    Created(BackupRecord),
    Deleted { id: String },
    Cleared,
    /// Local state was replaced; dependent views must reload
    Restored { id: String, requires_reload: bool },
}

/// Result of a successful restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub id: String,
    /// Sessions in the restored snapshot
    pub session_count: u64,
    /// Messages in the restored snapshot
    pub message_count: u64,
    /// Always true: the live state was replaced
    pub requires_reload: bool,
}

/// Raw backup content handed to a download/save collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedBackup {
    pub file_name: String,
    pub content: String,
}

/// Diagnostic summary of the store
#[derive(Debug, Clone)]
pub struct BackupStatus {
    pub config: BackupConfig,
    pub backend: BackendKind,
    pub location: String,
    pub backup_count: usize,
    pub total_size: u64,
    pub size_limit: u64,
    pub last_backup_time: i64,
    pub decision: BackupDecision,
}

/// Decide whether a backup is due
///
/// The size ceiling is checked first and wins over everything else. The
/// exporter only runs once the interval has elapsed.
pub fn decide<F>(
    config: &BackupConfig,
    runtime: &BackupRuntimeState,
    size_limit: u64,
    now_ms: i64,
    export: F,
) -> BackupDecision
where
    F: FnOnce() -> BackupResult<ExportedState>,
{
    if runtime.total_size > size_limit {
        return BackupDecision::SizeLimitExceeded {
            total_size: runtime.total_size,
            limit: size_limit,
        };
    }

    let interval_ms = config.interval_ms();
    let elapsed = now_ms.saturating_sub(runtime.last_backup_time);
    if elapsed < interval_ms {
        return BackupDecision::IntervalNotElapsed {
            remaining_ms: interval_ms - elapsed,
        };
    }

    match export() {
        Ok(exported) => {
            let current = fingerprint(
                exported.content.len(),
                exported.stats.session_count,
                exported.stats.message_count,
            );
            if current == runtime.last_backup_hash {
                BackupDecision::Unchanged
            } else {
                BackupDecision::Due
            }
        }
        Err(e) => BackupDecision::ExportFailed(e.to_string()),
    }
}

/// Creates, lists, restores, exports and deletes backups
pub struct BackupStore {
    backend: Arc<dyn StorageBackend>,
    exporter: Arc<dyn StateExporter>,
    merger: Arc<dyn StateMerger>,
    state: Mutex<BackupDocument>,
    persist_path: Option<PathBuf>,
    clock: Clock,
    size_limit: u64,
    events: broadcast::Sender<BackupEvent>,
}

impl BackupStore {
    /// Create a store over `document`; nothing is persisted until
    /// [`BackupStore::with_persistence`] is set
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        exporter: Arc<dyn StateExporter>,
        merger: Arc<dyn StateMerger>,
        mut document: BackupDocument,
    ) -> Self {
        document.runtime.normalize();
        let (events, _) = broadcast::channel(32);
        Self {
            backend,
            exporter,
            merger,
            state: Mutex::new(document),
            persist_path: None,
            clock: Arc::new(Utc::now),
            size_limit: MAX_TOTAL_SIZE_BYTES,
            events,
        }
    }

    /// Save the document to `path` after every change
    pub fn with_persistence(mut self, path: PathBuf) -> Self {
        self.persist_path = Some(path);
        self
    }

    /// Replace the time source
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Override the cumulative size ceiling
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = limit;
        self
    }

    /// Receive [`BackupEvent`]s
    pub fn subscribe(&self) -> broadcast::Receiver<BackupEvent> {
        self.events.subscribe()
    }

    /// The storage backend in use
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub async fn settings(&self) -> BackupConfig {
        self.state.lock().await.config.clone()
    }

    pub async fn runtime(&self) -> BackupRuntimeState {
        self.state.lock().await.runtime.clone()
    }

    /// Retained backups, oldest first
    pub async fn list_backups(&self) -> Vec<BackupRecord> {
        self.state.lock().await.runtime.backup_history.clone()
    }

    pub async fn get_backup(&self, id: &str) -> Option<BackupRecord> {
        self.state
            .lock()
            .await
            .runtime
            .backup_history
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub async fn latest_backup(&self) -> Option<BackupRecord> {
        self.state.lock().await.runtime.backup_history.last().cloned()
    }

    /// Merge a partial settings update, clamp it and persist it
    pub async fn update_settings(&self, update: SettingsUpdate) -> BackupResult<BackupConfig> {
        let mut doc = self.state.lock().await;
        let mut config = doc.config.clone();
        config.apply(update);
        let updated = BackupDocument {
            config: config.clamped(),
            ..(*doc).clone()
        };
        self.persist(&updated)?;
        *doc = updated;

        info!(
            enabled = doc.config.enabled,
            interval_hours = doc.config.interval_hours,
            max_backups = doc.config.max_backups,
            "backup settings updated"
        );
        Ok(doc.config.clone())
    }

    /// Replace in-memory state with the persisted document, if any
    pub async fn reload(&self) -> BackupResult<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let document = BackupDocument::load_or_create(path)?;
        *self.state.lock().await = document;
        Ok(())
    }

    /// Why a backup is, or is not, due right now
    pub async fn evaluate(&self) -> BackupDecision {
        let doc = self.state.lock().await;
        self.evaluate_locked(&doc)
    }

    /// True when the interval elapsed, the state changed and the size
    /// ceiling is not exceeded
    pub async fn should_create_backup(&self) -> bool {
        self.evaluate().await.is_due()
    }

    /// Create a backup now, regardless of schedule
    pub async fn create_backup(&self) -> BackupResult<BackupRecord> {
        let mut doc = self.state.lock().await;
        self.create_locked(&mut doc).await
    }

    /// Create a backup if enabled and due, as one step
    ///
    /// A size-ceiling skip is reported as [`BackupError::SizeLimitExceeded`].
    pub async fn run_if_due(&self) -> BackupResult<RunOutcome> {
        let mut doc = self.state.lock().await;
        if !doc.config.enabled {
            return Ok(RunOutcome::Disabled);
        }

        match self.evaluate_locked(&doc) {
            BackupDecision::Due => {
                let record = self.create_locked(&mut doc).await?;
                Ok(RunOutcome::Created(record))
            }
            BackupDecision::SizeLimitExceeded { total_size, limit } => {
                Err(BackupError::SizeLimitExceeded { total_size, limit })
            }
            decision => {
                debug!(?decision, "backup not due");
                Ok(RunOutcome::Skipped(decision))
            }
        }
    }

    /// Delete one backup
    ///
    /// Unknown ids succeed without doing anything. If the blob cannot be
    /// deleted the record is kept. A failed save of the document is
    /// returned after the blob is gone.
    pub async fn delete_backup(&self, id: &str) -> BackupResult<()> {
        let mut doc = self.state.lock().await;
        if self.delete_locked(&mut doc, id).await? {
            let _ = self.events.send(BackupEvent::Deleted { id: id.to_string() });
            self.persist(&doc)?;
        }
        Ok(())
    }

    /// Delete every backup and forget when the last one was taken
    ///
    /// Every record is attempted. Records whose blob could not be deleted are
    /// kept, the timing markers are left alone, and the first error is
    /// returned. A failed save is returned ahead of delete errors.
    pub async fn clear_all_backups(&self) -> BackupResult<()> {
        let mut doc = self.state.lock().await;
        let ids: Vec<String> = doc
            .runtime
            .backup_history
            .iter()
            .map(|r| r.id.clone())
            .collect();

        let mut first_error = None;
        for id in &ids {
            if let Err(e) = self.delete_locked(&mut doc, id).await {
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            self.persist(&doc)?;
            return Err(e);
        }

        doc.runtime = BackupRuntimeState::default();
        self.persist(&doc)?;
        info!(deleted = ids.len(), "all backups cleared");
        let _ = self.events.send(BackupEvent::Cleared);
        Ok(())
    }

    /// Restore a backup into the live application state
    ///
    /// Fails with [`BackupError::InvalidFormat`] before touching local state
    /// if the snapshot lacks a required section.
    pub async fn restore_backup(&self, id: &str) -> BackupResult<RestoreOutcome> {
        let doc = self.state.lock().await;
        let content = self.load_locked(&doc, id).await?;

        let restored = snapshot::parse_snapshot(&content).map_err(|e| {
            error!(id, "refusing to restore backup: {}", e);
            e
        })?;
        let (session_count, message_count) = snapshot::count_sessions(&restored);

        let local = self.merger.local_app_state()?;
        let merged = self.merger.merge_app_state(local, restored);
        self.merger.set_local_app_state(merged).map_err(|e| {
            error!(id, "failed to write restored state: {}", e);
            e
        })?;

        info!(id, session_count, message_count, "backup restored");
        let _ = self.events.send(BackupEvent::Restored {
            id: id.to_string(),
            requires_reload: true,
        });

        Ok(RestoreOutcome {
            id: id.to_string(),
            session_count,
            message_count,
            requires_reload: true,
        })
    }

    /// Raw content and file name of a backup
    pub async fn export_backup(&self, id: &str) -> BackupResult<ExportedBackup> {
        let doc = self.state.lock().await;
        let content = self.load_locked(&doc, id).await?;
        let file_name = find(&doc, id)
            .map(|r| r.file_name.clone())
            .ok_or_else(|| BackupError::backup_not_found(id))?;
        Ok(ExportedBackup { file_name, content })
    }

    /// Raw content of a backup
    pub async fn load_backup_content(&self, id: &str) -> BackupResult<String> {
        let doc = self.state.lock().await;
        self.load_locked(&doc, id).await
    }

    /// Keys in the backend that no record points at
    pub async fn find_orphans(&self) -> BackupResult<Vec<String>> {
        let doc = self.state.lock().await;
        let referenced: HashSet<String> = doc
            .runtime
            .backup_history
            .iter()
            .map(|r| self.backend.key_for(r))
            .collect();

        let keys = self.backend.list().await?;
        Ok(keys
            .into_iter()
            .filter(|k| !referenced.contains(k))
            .collect())
    }

    pub async fn status(&self) -> BackupStatus {
        let doc = self.state.lock().await;
        BackupStatus {
            config: doc.config.clone(),
            backend: self.backend.kind(),
            location: self.backend.location(),
            backup_count: doc.runtime.backup_history.len(),
            total_size: doc.runtime.total_size,
            size_limit: self.size_limit,
            last_backup_time: doc.runtime.last_backup_time,
            decision: self.evaluate_locked(&doc),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn evaluate_locked(&self, doc: &BackupDocument) -> BackupDecision {
        let decision = decide(
            &doc.config,
            &doc.runtime,
            self.size_limit,
            self.now().timestamp_millis(),
            || self.exporter.export_app_state(),
        );
        match &decision {
            BackupDecision::SizeLimitExceeded { total_size, limit } => {
                warn!(total_size, limit, "backup size limit exceeded, skipping backup");
            }
            BackupDecision::ExportFailed(reason) => {
                warn!("cannot fingerprint application state: {}", reason);
            }
            _ => {}
        }
        decision
    }

    async fn create_locked(&self, doc: &mut BackupDocument) -> BackupResult<BackupRecord> {
        let exported = self.exporter.export_app_state().map_err(|e| {
            error!("failed to export application state for backup: {}", e);
            e
        })?;

        let now = self.now();
        let mut id = new_backup_id();
        while find(doc, &id).is_some() {
            id = new_backup_id();
        }
        let record = BackupRecord {
            file_name: backup_file_name(now, &id),
            id,
            timestamp: now.timestamp_millis(),
            size: exported.content.len() as u64,
            session_count: exported.stats.session_count,
            message_count: exported.stats.message_count,
        };

        let key = self.backend.key_for(&record);
        let written = async {
            self.backend.ensure_container().await?;
            self.backend.write(&key, &exported.content).await
        }
        .await;
        if let Err(e) = written {
            error!(key = %key, "failed to write backup: {}", e);
            return Err(e);
        }

        let previous = doc.runtime.clone();
        doc.runtime.total_size += record.size;
        doc.runtime.backup_history.push(record.clone());
        doc.runtime.backup_history.sort_by_key(|r| r.timestamp);
        doc.runtime.last_backup_hash = fingerprint(
            exported.content.len(),
            exported.stats.session_count,
            exported.stats.message_count,
        );
        doc.runtime.last_backup_time = record.timestamp;
        let evicted = self.evict_locked(doc);

        if let Err(e) = self.persist(doc) {
            error!("failed to save backup history, discarding new backup: {}", e);
            doc.runtime = previous;
            if let Err(cleanup) = self.backend.delete(&key).await {
                warn!(key = %key, "new backup blob left behind as orphan: {}", cleanup);
            }
            return Err(e);
        }

        for old in evicted {
            self.delete_evicted(&old).await;
        }

        info!(
            file = %record.file_name,
            size = record.size,
            sessions = record.session_count,
            messages = record.message_count,
            "backup created"
        );
        let _ = self.events.send(BackupEvent::Created(record.clone()));
        Ok(record)
    }

    /// Drop the records retention evicts; their blobs are deleted once the
    /// shrunken history is saved
    fn evict_locked(&self, doc: &mut BackupDocument) -> Vec<BackupRecord> {
        let policy = RetentionPolicy::from_config(&doc.config, self.size_limit);
        let ids = policy.evictions(&doc.runtime.backup_history);
        let (evicted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut doc.runtime.backup_history)
            .into_iter()
            .partition(|r| ids.contains(&r.id));

        doc.runtime.backup_history = kept;
        doc.runtime.total_size = doc
            .runtime
            .total_size
            .saturating_sub(evicted.iter().map(|r| r.size).sum());
        evicted
    }

    async fn delete_evicted(&self, record: &BackupRecord) {
        let key = self.backend.key_for(record);
        match self.backend.delete(&key).await {
            Ok(()) => info!(id = %record.id, "evicted old backup"),
            Err(e) if e.is_not_found() => debug!(key = %key, "evicted backup blob already gone"),
            Err(e) => warn!(key = %key, "failed to delete evicted backup, blob left as orphan: {}", e),
        }
        let _ = self.events.send(BackupEvent::Deleted {
            id: record.id.clone(),
        });
    }

    /// Remove one record and its blob; `Ok(false)` if the id is unknown
    async fn delete_locked(&self, doc: &mut BackupDocument, id: &str) -> BackupResult<bool> {
        let Some(index) = doc.runtime.backup_history.iter().position(|r| r.id == id) else {
            debug!(id, "delete of unknown backup ignored");
            return Ok(false);
        };

        let key = self.backend.key_for(&doc.runtime.backup_history[index]);
        match self.backend.delete(&key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(key = %key, "backup blob already missing, dropping record");
            }
            Err(e) => {
                error!(key = %key, "failed to delete backup: {}", e);
                return Err(e);
            }
        }

        let record = doc.runtime.backup_history.remove(index);
        doc.runtime.total_size = doc.runtime.total_size.saturating_sub(record.size);
        Ok(true)
    }

    async fn load_locked(&self, doc: &BackupDocument, id: &str) -> BackupResult<String> {
        let record = find(doc, id).ok_or_else(|| BackupError::backup_not_found(id))?;
        let key = self.backend.key_for(record);

        self.backend.read(&key).await.map_err(|e| {
            error!(key = %key, "failed to load backup: {}", e);
            if e.is_not_found() {
                BackupError::backup_not_found(id)
            } else {
                e
            }
        })
    }

    fn persist(&self, doc: &BackupDocument) -> BackupResult<()> {
        match &self.persist_path {
            Some(path) => doc.save(path),
            None => Ok(()),
        }
    }
}

fn find<'a>(doc: &'a BackupDocument, id: &str) -> Option<&'a BackupRecord> {
    doc.runtime.backup_history.iter().find(|r| r.id == id)
}
