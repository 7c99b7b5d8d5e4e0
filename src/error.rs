//! Custom error types for autobackup
//!
//! This module defines the error hierarchy for the backup engine using
//! thiserror for ergonomic error definitions.

use thiserror::Error;

/// The main error type for backup operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors outside the storage backend
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Storage backend unreachable, permission denied, disk full
    #[error("Storage error: {0}")]
    Storage(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Restored content failed structural validation
    #[error("Invalid backup format: {0}")]
    InvalidFormat(String),

    /// The state exporter could not produce a snapshot
    #[error("Export error: {0}")]
    Export(String),

    /// Retained backups already exceed the size ceiling; creation is skipped
    #[error("Backup size limit exceeded: {total_size} bytes retained, limit is {limit} bytes")]
    SizeLimitExceeded { total_size: u64, limit: u64 },
}

impl BackupError {
    /// Create a "not found" error for a backup record or blob
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error only signals a skipped backup rather than a failure
    pub fn is_soft_skip(&self) -> bool {
        matches!(self, Self::SizeLimitExceeded { .. })
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackupError::Config("test error".into());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_not_found_error() {
        let err = BackupError::backup_not_found("1a2b3c4d");
        assert_eq!(err.to_string(), "Backup not found: 1a2b3c4d");
        assert!(err.is_not_found());
        assert!(!err.is_soft_skip());
    }

    #[test]
    fn test_size_limit_is_soft_skip() {
        let err = BackupError::SizeLimitExceeded {
            total_size: 200,
            limit: 100,
        };
        assert!(err.is_soft_skip());
        assert_eq!(
            err.to_string(),
            "Backup size limit exceeded: 200 bytes retained, limit is 100 bytes"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BackupError = io_err.into();
        assert!(matches!(err, BackupError::Io(_)));
    }
}
