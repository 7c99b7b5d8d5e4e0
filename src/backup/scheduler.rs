//! Backup scheduler background loop.
//!
//! Spawns a tokio task that checks once at startup and then on a fixed
//! cadence whether a backup is due, and creates it if so. Failures are logged
//! and retried on the next tick; they never stop the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::BackupError;

use super::store::{BackupDecision, BackupStore, RunOutcome};

/// Default interval between scheduler ticks (5 minutes)
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(5 * 60);

/// What one tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Automatic backups are switched off
    Disabled,
    /// A backup was not due, or was skipped for size
    Skipped(BackupDecision),
    /// A backup was created with this id
    Created(String),
    /// Creating the backup failed; the next tick retries
    Failed(String),
}

/// Periodically triggers backups on a shared [`BackupStore`]
pub struct BackupScheduler {
    store: Arc<BackupStore>,
    period: Duration,
    reload_each_tick: bool,
}

impl BackupScheduler {
    /// Create a scheduler with the default 5 minute period
    pub fn new(store: Arc<BackupStore>) -> Self {
        Self {
            store,
            period: DEFAULT_TICK_PERIOD,
            reload_each_tick: false,
        }
    }

    /// Override the tick period
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period.max(Duration::from_millis(1));
        self
    }

    /// Re-read the persisted settings before every tick, so changes made by
    /// other processes are picked up
    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload_each_tick = reload;
        self
    }

    /// The tick period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start the scheduler background loop; runs until `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(period_secs = self.period.as_secs(), "backup scheduler started");
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.tick().await;
                    }
                }
            }

            info!("backup scheduler stopped");
        })
    }

    /// Execute one scheduler tick
    pub async fn tick(&self) -> TickOutcome {
        if self.reload_each_tick {
            if let Err(e) = self.store.reload().await {
                warn!("cannot reload backup settings, using cached copy: {e}");
            }
        }

        match self.store.run_if_due().await {
            Ok(RunOutcome::Disabled) => TickOutcome::Disabled,
            Ok(RunOutcome::Skipped(decision)) => TickOutcome::Skipped(decision),
            Ok(RunOutcome::Created(record)) => {
                debug!(id = %record.id, "scheduled backup created");
                TickOutcome::Created(record.id)
            }
            Err(BackupError::SizeLimitExceeded { total_size, limit }) => {
                TickOutcome::Skipped(BackupDecision::SizeLimitExceeded { total_size, limit })
            }
            Err(e) => {
                error!("scheduled backup failed, retrying next tick: {e}");
                TickOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::MemoryAppState;
    use crate::backup::store::BackupEvent;
    use crate::config::settings::{BackupConfig, BackupDocument};
    use crate::storage::KeyValueBackend;
    use serde_json::json;

    fn scheduler_with(
        config: BackupConfig,
    ) -> (BackupScheduler, Arc<BackupStore>, Arc<MemoryAppState>) {
        let app = Arc::new(MemoryAppState::default());
        let store = Arc::new(BackupStore::new(
            Arc::new(KeyValueBackend::in_memory()),
            app.clone(),
            app.clone(),
            BackupDocument {
                config,
                ..BackupDocument::default()
            },
        ));
        (BackupScheduler::new(Arc::clone(&store)), store, app)
    }

    fn enabled() -> BackupConfig {
        BackupConfig {
            enabled: true,
            ..BackupConfig::default()
        }
    }

    #[tokio::test]
    async fn test_tick_disabled_is_noop() {
        let (scheduler, store, _app) = scheduler_with(BackupConfig::default());

        assert_eq!(scheduler.tick().await, TickOutcome::Disabled);
        assert!(store.list_backups().await.is_empty());
    }

    #[tokio::test]
    async fn test_tick_creates_then_skips() {
        let (scheduler, store, app) = scheduler_with(enabled());

        let TickOutcome::Created(id) = scheduler.tick().await else {
            panic!("first tick should create a backup");
        };
        assert_eq!(store.latest_backup().await.unwrap().id, id);

        app.replace(json!({ "changed": true }));
        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Skipped(BackupDecision::IntervalNotElapsed { .. })
        ));
        assert_eq!(store.list_backups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_tick_reports_size_skip() {
        let app = Arc::new(MemoryAppState::default());
        let store = Arc::new(
            BackupStore::new(
                Arc::new(KeyValueBackend::in_memory()),
                app.clone(),
                app,
                BackupDocument {
                    config: enabled(),
                    ..BackupDocument::default()
                },
            )
            .with_size_limit(0),
        );
        store.create_backup().await.unwrap();

        let scheduler = BackupScheduler::new(store);
        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Skipped(BackupDecision::SizeLimitExceeded { limit: 0, .. })
        ));
    }

    #[test]
    fn test_with_period_overrides_default() {
        let (scheduler, _store, _app) = scheduler_with(enabled());
        assert_eq!(scheduler.period(), DEFAULT_TICK_PERIOD);
        let scheduler = scheduler.with_period(Duration::from_secs(1));
        assert_eq!(scheduler.period(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_spawn_checks_at_startup_and_stops() {
        let (scheduler, store, _app) = scheduler_with(enabled());
        let mut events = store.subscribe();
        let shutdown = CancellationToken::new();

        let handle = scheduler
            .with_period(Duration::from_secs(3600))
            .spawn(shutdown.clone());

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv()).await;
        assert!(matches!(event, Ok(Ok(BackupEvent::Created(_)))));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
