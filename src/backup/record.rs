//! Backup records and file-name derivation

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of every backup file name
pub const FILE_NAME_PREFIX: &str = "AutoBackup-";

/// Length of the random id suffix
pub const ID_LEN: usize = 8;

/// Metadata about one stored backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    /// Short random id, unique within the history
    pub id: String,
    /// Creation time, epoch millis
    pub timestamp: i64,
    /// Derived from timestamp and id; the file backend's storage key
    pub file_name: String,
    /// Content size in bytes
    pub size: u64,
    /// Number of chat sessions in the snapshot
    pub session_count: u64,
    /// Number of messages across all sessions in the snapshot
    pub message_count: u64,
}

impl BackupRecord {
    /// Creation time as a UTC datetime
    pub fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }
}

/// Generate a fresh record id
pub fn new_backup_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}

/// Build the file name for a backup: `AutoBackup-<iso>-<id>.json`
///
/// The ISO-8601 timestamp keeps millisecond precision and has every `:` and
/// `.` replaced with `_`, so names sort chronologically and are valid on
/// every filesystem.
pub fn backup_file_name(created_at: DateTime<Utc>, id: &str) -> String {
    let iso = created_at
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "_");
    format!("{}{}-{}.json", FILE_NAME_PREFIX, iso, id)
}
