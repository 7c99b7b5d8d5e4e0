//! Application state collaborators
//!
//! The engine never owns application state. It reads it through a
//! [`StateExporter`] when creating backups and writes it back through a
//! [`StateMerger`] when restoring.

use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::error::{BackupError, BackupResult};
use crate::snapshot::{self, ExportedState, ACCESS_SECTION, CHAT_SECTION, CONFIG_SECTION};
use crate::storage::file_io::{read_json_required, write_json_atomic};

/// Produces snapshots of the live application state
///
/// Called on every scheduler tick, so it must be side-effect free and cheap.
pub trait StateExporter: Send + Sync {
    fn export_app_state(&self) -> BackupResult<ExportedState>;
}

/// Reads, replaces and merges the live application state during restore
pub trait StateMerger: Send + Sync {
    fn local_app_state(&self) -> BackupResult<Value>;

    fn set_local_app_state(&self, state: Value) -> BackupResult<()>;

    fn merge_app_state(&self, local: Value, restored: Value) -> Value {
        snapshot::merge_app_state(local, restored)
    }
}

/// An application state with every section present and empty
pub fn empty_app_state() -> Value {
    json!({
        CHAT_SECTION: { "sessions": [] },
        CONFIG_SECTION: {},
        ACCESS_SECTION: {},
    })
}

/// Application state kept in a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileAppState {
    path: PathBuf,
}

impl JsonFileAppState {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> BackupResult<Value> {
        if !self.path.exists() {
            return Ok(empty_app_state());
        }
        read_json_required(&self.path)
    }
}

impl StateExporter for JsonFileAppState {
    fn export_app_state(&self) -> BackupResult<ExportedState> {
        let state = self
            .load()
            .map_err(|e| BackupError::Export(format!("Failed to read application state: {}", e)))?;
        ExportedState::from_value(&state)
    }
}

impl StateMerger for JsonFileAppState {
    fn local_app_state(&self) -> BackupResult<Value> {
        self.load()
    }

    fn set_local_app_state(&self, state: Value) -> BackupResult<()> {
        write_json_atomic(&self.path, &state)
    }
}

/// Application state held in memory, for embedding hosts and tests
#[derive(Debug)]
pub struct MemoryAppState {
    state: Mutex<Value>,
}

impl MemoryAppState {
    pub fn new(state: Value) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Replace the live state
    pub fn replace(&self, state: Value) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    /// A copy of the live state
    pub fn current(&self) -> Value {
        self.state
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(Value::Null)
    }
}

impl Default for MemoryAppState {
    fn default() -> Self {
        Self::new(empty_app_state())
    }
}

impl StateExporter for MemoryAppState {
    fn export_app_state(&self) -> BackupResult<ExportedState> {
        let guard = self
            .state
            .lock()
            .map_err(|_| BackupError::Export("Application state lock poisoned".into()))?;
        ExportedState::from_value(&guard)
    }
}

impl StateMerger for MemoryAppState {
    fn local_app_state(&self) -> BackupResult<Value> {
        Ok(self.current())
    }

    fn set_local_app_state(&self, state: Value) -> BackupResult<()> {
        self.replace(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_exports_empty_state() {
        let temp_dir = TempDir::new().unwrap();
        let app = JsonFileAppState::new(temp_dir.path().join("state.json"));

        let exported = app.export_app_state().unwrap();
        assert_eq!(exported.stats.session_count, 0);
        assert!(snapshot::parse_snapshot(&exported.content).is_ok());
    }

    #[test]
    fn test_file_state_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let app = JsonFileAppState::new(temp_dir.path().join("state.json"));

        let mut state = empty_app_state();
        state[CHAT_SECTION]["sessions"] = json!([{ "id": "s1", "messages": [{ "id": "m1" }] }]);
        app.set_local_app_state(state.clone()).unwrap();

        assert_eq!(app.local_app_state().unwrap(), state);
        let exported = app.export_app_state().unwrap();
        assert_eq!(exported.stats.session_count, 1);
        assert_eq!(exported.stats.message_count, 1);
    }

    #[test]
    fn test_unreadable_file_is_export_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "{ broken").unwrap();

        let err = JsonFileAppState::new(path).export_app_state().unwrap_err();
        assert!(matches!(err, BackupError::Export(_)));
    }

    #[test]
    fn test_memory_state() {
        let app = MemoryAppState::default();
        assert_eq!(app.current(), empty_app_state());

        app.set_local_app_state(json!({ "x": 1 })).unwrap();
        assert_eq!(app.local_app_state().unwrap(), json!({ "x": 1 }));
    }
}
