//! Application state snapshots
//!
//! A snapshot is a JSON object with three required top-level sections: chat
//! data, configuration, and access/credentials. This module validates
//! snapshots, computes their summary statistics, and merges a restored
//! snapshot into the live local state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BackupError, BackupResult};

/// Chat sessions and messages
pub const CHAT_SECTION: &str = "chat-next-web-store";
/// Application configuration
pub const CONFIG_SECTION: &str = "app-config";
/// Access control and credentials
pub const ACCESS_SECTION: &str = "access-control";

/// Sections every restorable snapshot must contain
pub const REQUIRED_SECTIONS: [&str; 3] = [CHAT_SECTION, CONFIG_SECTION, ACCESS_SECTION];

const LAST_UPDATE_FIELD: &str = "lastUpdateTime";

/// Summary statistics of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    pub session_count: u64,
    pub message_count: u64,
    /// Serialized size in bytes
    pub total_size: u64,
}

/// A serialized snapshot ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedState {
    pub content: String,
    pub stats: SnapshotStats,
}

impl ExportedState {
    /// Serialize a snapshot value and compute its statistics
    pub fn from_value(state: &Value) -> BackupResult<Self> {
        let content = serde_json::to_string(state)
            .map_err(|e| BackupError::Export(format!("Failed to serialize state: {}", e)))?;
        let (session_count, message_count) = count_sessions(state);
        Ok(Self {
            stats: SnapshotStats {
                session_count,
                message_count,
                total_size: content.len() as u64,
            },
            content,
        })
    }
}

/// Count chat sessions and the messages they hold
pub fn count_sessions(state: &Value) -> (u64, u64) {
    let sessions = state
        .get(CHAT_SECTION)
        .and_then(|chat| chat.get("sessions"))
        .and_then(Value::as_array);

    match sessions {
        Some(sessions) => {
            let messages = sessions
                .iter()
                .filter_map(|s| s.get("messages").and_then(Value::as_array))
                .map(|m| m.len() as u64)
                .sum();
            (sessions.len() as u64, messages)
        }
        None => (0, 0),
    }
}

/// Parse backup content and check it has every required section
pub fn parse_snapshot(content: &str) -> BackupResult<Value> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| BackupError::InvalidFormat(format!("Backup is not valid JSON: {}", e)))?;

    let Some(object) = value.as_object() else {
        return Err(BackupError::InvalidFormat(
            "Backup must be a JSON object".into(),
        ));
    };

    let missing: Vec<&str> = REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|section| !object.get(*section).is_some_and(Value::is_object))
        .collect();

    if !missing.is_empty() {
        return Err(BackupError::InvalidFormat(format!(
            "Backup is missing required sections: {}",
            missing.join(", ")
        )));
    }

    Ok(value)
}

/// Merge a restored snapshot into the local state
///
/// Chat sessions are unioned by `id`; messages of a session present on both
/// sides are unioned by `id`, local messages first. For every other section
/// the side with the newer `lastUpdateTime` wins field by field, ties keep
/// local. Sections only the restored snapshot has are copied in.
pub fn merge_app_state(local: Value, restored: Value) -> Value {
    let Value::Object(restored) = restored else {
        return local;
    };
    let mut merged = match local {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    for (key, remote) in restored {
        let combined = match merged.remove(&key) {
            None => remote,
            Some(Value::Object(local_section)) => match remote {
                Value::Object(remote_section) if key == CHAT_SECTION => {
                    Value::Object(merge_chat(local_section, remote_section))
                }
                Value::Object(remote_section) => {
                    Value::Object(merge_with_update(local_section, remote_section))
                }
                _ => Value::Object(local_section),
            },
            Some(other) => other,
        };
        merged.insert(key, combined);
    }

    Value::Object(merged)
}

fn merge_chat(mut local: Map<String, Value>, mut remote: Map<String, Value>) -> Map<String, Value> {
    let remote_sessions = match remote.remove("sessions") {
        Some(Value::Array(sessions)) => sessions,
        _ => Vec::new(),
    };
    let mut sessions = match local.remove("sessions") {
        Some(Value::Array(sessions)) => sessions,
        _ => Vec::new(),
    };

    for remote_session in remote_sessions {
        let position = id_of(&remote_session)
            .and_then(|id| sessions.iter().position(|s| id_of(s) == Some(id)));
        match position {
            Some(index) => merge_messages(&mut sessions[index], remote_session),
            None => sessions.push(remote_session),
        }
    }

    local.insert("sessions".into(), Value::Array(sessions));
    for (key, value) in remote {
        local.entry(key).or_insert(value);
    }
    local
}

fn merge_messages(local_session: &mut Value, remote_session: Value) {
    let Some(remote_messages) = remote_session
        .get("messages")
        .and_then(Value::as_array)
        .cloned()
    else {
        return;
    };
    if !local_session.get("messages").is_some_and(Value::is_array) {
        if let Some(session) = local_session.as_object_mut() {
            session.insert("messages".into(), Value::Array(remote_messages));
        }
        return;
    }
    let Some(local_messages) = local_session
        .get_mut("messages")
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for message in remote_messages {
        let known = id_of(&message)
            .is_some_and(|id| local_messages.iter().any(|m| id_of(m) == Some(id)));
        if !known {
            local_messages.push(message);
        }
    }
}

fn merge_with_update(
    mut local: Map<String, Value>,
    remote: Map<String, Value>,
) -> Map<String, Value> {
    let remote_is_newer = last_update(&remote) > last_update(&local);
    for (key, value) in remote {
        if remote_is_newer || !local.contains_key(&key) {
            local.insert(key, value);
        }
    }
    local
}

fn last_update(section: &Map<String, Value>) -> f64 {
    section
        .get(LAST_UPDATE_FIELD)
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

fn id_of(value: &Value) -> Option<&Value> {
    value.get("id").filter(|id| !id.is_null())
}
