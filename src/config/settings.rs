//! Backup settings and the persisted backup document
//!
//! Holds the user-editable [`BackupConfig`], the engine-owned
//! [`BackupRuntimeState`], and the versioned [`BackupDocument`] that stores
//! both on disk. Legacy documents are normalized by [`migrate_document`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backup::BackupRecord;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::{read_json_required, write_json_atomic};

/// Shortest allowed interval between backups
pub const MIN_INTERVAL_HOURS: u32 = 1;
/// Longest allowed interval between backups (one week)
pub const MAX_INTERVAL_HOURS: u32 = 168;
/// Default interval between backups (daily)
pub const DEFAULT_INTERVAL_HOURS: u32 = 24;

/// Smallest allowed retention count
pub const MIN_MAX_BACKUPS: u32 = 1;
/// Largest allowed retention count
pub const MAX_MAX_BACKUPS: u32 = 50;
/// Default retention count
pub const DEFAULT_MAX_BACKUPS: u32 = 10;

/// Hard ceiling on the cumulative size of retained backups (100 MiB)
pub const MAX_TOTAL_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Schema version written by this crate
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// User-editable backup configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    /// Master switch; backups are opt-in
    #[serde(default)]
    pub enabled: bool,

    /// Minimum time between backups, in hours
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,

    /// Retention count ceiling
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,

    /// Storage location override (file backend only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}

fn default_interval_hours() -> u32 {
    DEFAULT_INTERVAL_HOURS
}

fn default_max_backups() -> u32 {
    DEFAULT_MAX_BACKUPS
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            max_backups: default_max_backups(),
            backup_path: None,
        }
    }
}

impl BackupConfig {
    /// Return a copy with every field forced into its valid range
    pub fn clamped(&self) -> Self {
        Self {
            enabled: self.enabled,
            interval_hours: self
                .interval_hours
                .clamp(MIN_INTERVAL_HOURS, MAX_INTERVAL_HOURS),
            max_backups: self.max_backups.clamp(MIN_MAX_BACKUPS, MAX_MAX_BACKUPS),
            backup_path: self
                .backup_path
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        }
    }

    /// The backup interval in milliseconds, after clamping
    pub fn interval_ms(&self) -> i64 {
        i64::from(self.clamped().interval_hours) * 60 * 60 * 1000
    }

    /// Apply a partial update
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(interval_hours) = update.interval_hours {
            self.interval_hours = interval_hours;
        }
        if let Some(max_backups) = update.max_backups {
            self.max_backups = max_backups;
        }
        if let Some(backup_path) = update.backup_path {
            self.backup_path = backup_path;
        }
    }
}

/// A partial [`BackupConfig`] update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub interval_hours: Option<u32>,
    pub max_backups: Option<u32>,
    /// `Some(None)` clears the override
    pub backup_path: Option<Option<String>>,
}

impl SettingsUpdate {
    /// Check if the update changes nothing
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Engine-owned backup state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRuntimeState {
    /// Epoch millis of the most recent successful backup, 0 = never
    #[serde(default)]
    pub last_backup_time: i64,

    /// Fingerprint of the state at the last successful backup
    #[serde(default)]
    pub last_backup_hash: String,

    /// Retained backups, ascending by timestamp
    #[serde(default)]
    pub backup_history: Vec<BackupRecord>,

    /// Sum of all record sizes
    #[serde(default)]
    pub total_size: u64,
}

impl BackupRuntimeState {
    /// Sort history by timestamp and recompute `total_size` from it
    pub fn normalize(&mut self) {
        self.backup_history.sort_by_key(|r| r.timestamp);
        self.total_size = self.backup_history.iter().map(|r| r.size).sum();
    }
}

/// The persisted document: configuration plus runtime state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    /// Schema version for migration support
    pub version: u32,

    #[serde(flatten)]
    pub config: BackupConfig,

    #[serde(flatten)]
    pub runtime: BackupRuntimeState,
}

impl Default for BackupDocument {
    fn default() -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            config: BackupConfig::default(),
            runtime: BackupRuntimeState::default(),
        }
    }
}

impl BackupDocument {
    /// Load the document from disk (migrating legacy shapes), or return the
    /// default document if the file doesn't exist
    pub fn load_or_create(path: &Path) -> BackupResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no backup settings found, using defaults");
            return Ok(Self::default());
        }

        let raw: Value = read_json_required(path)?;
        migrate_document(raw)
    }

    /// Save the document to disk atomically
    pub fn save(&self, path: &Path) -> BackupResult<()> {
        write_json_atomic(path, self)
    }
}

/// Normalize any known persisted shape into the canonical document
///
/// Accepts both the wrapped persisted-store shape
/// (`{"state": {...}, "version": 1.1}`) and a flat object. Documents older
/// than 1.1 get a valid `intervalHours`; 1.2 documents carry no history and
/// start with an empty one. The result is always clamped with a recomputed
/// `totalSize`.
pub fn migrate_document(raw: Value) -> BackupResult<BackupDocument> {
    let Value::Object(mut outer) = raw else {
        return Err(BackupError::Config(
            "Backup settings must be a JSON object".into(),
        ));
    };

    let outer_version = outer.get("version").and_then(Value::as_f64);
    let mut state = match outer.remove("state") {
        Some(Value::Object(inner)) => inner,
        Some(_) => {
            return Err(BackupError::Config(
                "Backup settings `state` must be a JSON object".into(),
            ))
        }
        None => outer,
    };
    let version = outer_version
        .or_else(|| state.get("version").and_then(Value::as_f64))
        .unwrap_or(0.0);

    if version < 1.1 {
        let valid = state
            .get("intervalHours")
            .and_then(Value::as_f64)
            .is_some_and(|h| h > 0.0);
        if !valid {
            state.insert("intervalHours".into(), Value::from(DEFAULT_INTERVAL_HOURS));
        }
    }

    let has_history = version >= f64::from(CURRENT_SCHEMA_VERSION) || version < 1.2;
    if !has_history {
        state.remove("backupHistory");
        state.remove("maxBackups");
        state.remove("totalSize");
    }

    let config = BackupConfig {
        enabled: state
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        interval_hours: read_count(&state, "intervalHours", DEFAULT_INTERVAL_HOURS),
        max_backups: read_count(&state, "maxBackups", DEFAULT_MAX_BACKUPS),
        backup_path: state
            .get("backupPath")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
    .clamped();

    let backup_history = match state.remove("backupHistory") {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<BackupRecord>(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("dropping unreadable backup history entry: {}", e);
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut runtime = BackupRuntimeState {
        last_backup_time: state
            .get("lastBackupTime")
            .and_then(Value::as_f64)
            .map(|t| t.max(0.0) as i64)
            .unwrap_or(0),
        last_backup_hash: state
            .get("lastBackupHash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        backup_history,
        total_size: 0,
    };
    runtime.normalize();

    Ok(BackupDocument {
        version: CURRENT_SCHEMA_VERSION,
        config,
        runtime,
    })
}

/// Read a non-negative count that may have been stored as a float
fn read_count(state: &serde_json::Map<String, Value>, key: &str, default: u32) -> u32 {
    match state.get(key).and_then(Value::as_f64) {
        Some(n) if n.is_finite() && n >= 0.0 => n.min(f64::from(u32::MAX)) as u32,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str, timestamp: i64, size: u64) -> BackupRecord {
        BackupRecord {
            id: id.to_string(),
            timestamp,
            file_name: format!("AutoBackup-{}-{}.json", timestamp, id),
            size,
            session_count: 1,
            message_count: 2,
        }
    }

    #[test]
    fn test_default_config() {
        let config = BackupConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval_hours, 24);
        assert_eq!(config.max_backups, 10);
        assert!(config.backup_path.is_none());
    }

    #[test]
    fn test_clamped() {
        let config = BackupConfig {
            enabled: true,
            interval_hours: 0,
            max_backups: 500,
            backup_path: Some("   ".into()),
        }
        .clamped();

        assert_eq!(config.interval_hours, MIN_INTERVAL_HOURS);
        assert_eq!(config.max_backups, MAX_MAX_BACKUPS);
        assert!(config.backup_path.is_none());
        assert_eq!(
            BackupConfig {
                interval_hours: 1000,
                ..BackupConfig::default()
            }
            .interval_ms(),
            168 * 3_600_000
        );
    }

    #[test]
    fn test_apply_partial_update() {
        let mut config = BackupConfig {
            backup_path: Some("/tmp/x".into()),
            ..BackupConfig::default()
        };
        config.apply(SettingsUpdate {
            enabled: Some(true),
            interval_hours: Some(6),
            ..SettingsUpdate::default()
        });

        assert!(config.enabled);
        assert_eq!(config.interval_hours, 6);
        assert_eq!(config.max_backups, DEFAULT_MAX_BACKUPS);
        assert_eq!(config.backup_path.as_deref(), Some("/tmp/x"));

        config.apply(SettingsUpdate {
            backup_path: Some(None),
            ..SettingsUpdate::default()
        });
        assert!(config.backup_path.is_none());
        assert!(SettingsUpdate::default().is_empty());
    }

    #[test]
    fn test_document_layout_is_flat_camel_case() {
        let mut doc = BackupDocument::default();
        doc.runtime.backup_history.push(record("aaaaaaaa", 10, 5));
        doc.runtime.normalize();

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["version"], 2);
        assert_eq!(value["intervalHours"], 24);
        assert_eq!(value["maxBackups"], 10);
        assert_eq!(value["totalSize"], 5);
        assert_eq!(value["backupHistory"][0]["fileName"], "AutoBackup-10-aaaaaaaa.json");
    }

    #[test]
    fn test_migrate_pre_1_1_fixes_interval() {
        let doc = migrate_document(json!({
            "state": { "enabled": true, "intervalHours": 0, "lastBackupTime": 42 },
            "version": 1.0
        }))
        .unwrap();

        assert!(doc.config.enabled);
        assert_eq!(doc.config.interval_hours, 24);
        assert_eq!(doc.runtime.last_backup_time, 42);
        assert_eq!(doc.version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_minimal_1_2_drops_history() {
        let doc = migrate_document(json!({
            "state": {
                "enabled": true,
                "intervalHours": 12,
                "backupPath": "",
                "lastBackupTime": 1000,
                "lastBackupHash": "abc",
                "backupHistory": [ { "id": "x" } ],
                "maxBackups": 3,
                "totalSize": 99
            },
            "version": 1.2
        }))
        .unwrap();

        assert_eq!(doc.config.interval_hours, 12);
        assert_eq!(doc.config.max_backups, DEFAULT_MAX_BACKUPS);
        assert!(doc.config.backup_path.is_none());
        assert!(doc.runtime.backup_history.is_empty());
        assert_eq!(doc.runtime.total_size, 0);
        assert_eq!(doc.runtime.last_backup_hash, "abc");
    }

    #[test]
    fn test_migrate_canonical_recomputes_total_size() {
        let mut doc = BackupDocument::default();
        doc.config.max_backups = 5;
        doc.runtime.backup_history = vec![record("bbbbbbbb", 20, 7), record("aaaaaaaa", 10, 3)];
        let mut value = serde_json::to_value(&doc).unwrap();
        value["totalSize"] = json!(12345);
        value["maxBackups"] = json!(900);

        let migrated = migrate_document(value).unwrap();
        assert_eq!(migrated.runtime.total_size, 10);
        assert_eq!(migrated.runtime.backup_history[0].id, "aaaaaaaa");
        assert_eq!(migrated.config.max_backups, MAX_MAX_BACKUPS);
    }

    #[test]
    fn test_migrate_rejects_non_object() {
        assert!(migrate_document(json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("autobackup.json");

        assert_eq!(
            BackupDocument::load_or_create(&path).unwrap(),
            BackupDocument::default()
        );

        let mut doc = BackupDocument::default();
        doc.config.enabled = true;
        doc.config.backup_path = Some("/srv/backups".into());
        doc.runtime.last_backup_hash = "k2j3".into();
        doc.runtime.backup_history.push(record("cccccccc", 5, 11));
        doc.runtime.normalize();
        doc.save(&path).unwrap();

        let loaded = BackupDocument::load_or_create(&path).unwrap();
        assert_eq!(loaded, doc);
    }
}
