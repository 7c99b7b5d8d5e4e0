//! Retention policy for backup history
//!
//! Decides which backups to evict, strictly oldest first, so that the
//! history fits the count ceiling and, where possible, the size ceiling.

use crate::config::settings::{BackupConfig, MAX_TOTAL_SIZE_BYTES};

use super::record::BackupRecord;

/// Count and size limits applied after every backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of retained backups
    pub max_backups: usize,
    /// Maximum cumulative size of retained backups
    pub max_total_size: u64,
}

impl RetentionPolicy {
    /// Build the policy from a (clamped) configuration
    pub fn from_config(config: &BackupConfig, max_total_size: u64) -> Self {
        Self {
            max_backups: config.clamped().max_backups as usize,
            max_total_size,
        }
    }

    /// Ids to evict, oldest first
    ///
    /// `history` need not be sorted. Records are dropped until at most
    /// `max_backups` remain; then, while more than one record remains and the
    /// total still exceeds `max_total_size`, the oldest is dropped. The newest
    /// record is never evicted for size.
    pub fn evictions(&self, history: &[BackupRecord]) -> Vec<String> {
        let mut ordered: Vec<&BackupRecord> = history.iter().collect();
        ordered.sort_by_key(|r| r.timestamp);

        let mut remaining_len = ordered.len();
        let mut remaining_size: u64 = ordered.iter().map(|r| r.size).sum();
        let mut evicted = Vec::new();

        for record in ordered {
            let over_count = remaining_len > self.max_backups.max(1);
            let over_size = remaining_len > 1 && remaining_size > self.max_total_size;
            if !over_count && !over_size {
                break;
            }
            evicted.push(record.id.clone());
            remaining_len -= 1;
            remaining_size -= record.size;
        }

        evicted
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&BackupConfig::default(), MAX_TOTAL_SIZE_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, timestamp: i64, size: u64) -> BackupRecord {
        BackupRecord {
            id: id.to_string(),
            timestamp,
            file_name: format!("{}.json", id),
            size,
            session_count: 0,
            message_count: 0,
        }
    }

    fn policy(max_backups: usize, max_total_size: u64) -> RetentionPolicy {
        RetentionPolicy {
            max_backups,
            max_total_size,
        }
    }

    #[test]
    fn test_within_limits_evicts_nothing() {
        let history = vec![record("a", 1, 10), record("b", 2, 10)];
        assert!(policy(2, 100).evictions(&history).is_empty());
        assert!(policy(2, 100).evictions(&[]).is_empty());
    }

    #[test]
    fn test_count_evicts_oldest_first() {
        let history = vec![
            record("c", 3, 10),
            record("a", 1, 10),
            record("d", 4, 10),
            record("b", 2, 10),
        ];

        assert_eq!(policy(2, u64::MAX).evictions(&history), vec!["a", "b"]);
        assert_eq!(policy(3, u64::MAX).evictions(&history), vec!["a"]);
    }

    #[test]
    fn test_zero_max_backups_keeps_one() {
        let history = vec![record("a", 1, 10), record("b", 2, 10)];
        assert_eq!(policy(0, u64::MAX).evictions(&history), vec!["a"]);
    }

    #[test]
    fn test_size_evicts_but_keeps_newest() {
        let history = vec![record("a", 1, 60), record("b", 2, 60), record("c", 3, 60)];
        assert_eq!(policy(10, 100).evictions(&history), vec!["a", "b"]);

        let oversized = vec![record("big", 1, 500)];
        assert!(policy(10, 100).evictions(&oversized).is_empty());
    }

    #[test]
    fn test_from_config_clamps() {
        let config = BackupConfig {
            max_backups: 0,
            ..BackupConfig::default()
        };
        assert_eq!(RetentionPolicy::from_config(&config, 1).max_backups, 1);
        assert_eq!(RetentionPolicy::default().max_backups, 10);
    }
}
