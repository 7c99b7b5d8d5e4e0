//! Backup CLI commands
//!
//! Implements CLI commands for backup management.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Subcommand;
use tokio_util::sync::CancellationToken;

use crate::backup::{BackupDecision, BackupRecord, BackupScheduler, BackupStore};
use crate::config::settings::{MAX_INTERVAL_HOURS, MAX_MAX_BACKUPS};
use crate::config::SettingsUpdate;
use crate::error::{BackupError, BackupResult};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Run the scheduler until interrupted
    Run {
        /// Seconds between checks
        #[arg(long, default_value = "300")]
        period_secs: u64,
    },

    /// Create a backup now
    Now,

    /// List all retained backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show settings and whether a backup is due
    Status,

    /// Restore a backup into the application state
    Restore {
        /// Backup id (use 'latest' for most recent)
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Write a backup's content to a file
    Export {
        /// Backup id (use 'latest' for most recent)
        backup: String,

        /// Destination file or directory (defaults to the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a backup
    Delete {
        /// Backup id
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Delete every backup
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Change backup settings
    Config {
        /// Turn automatic backups on
        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        /// Turn automatic backups off
        #[arg(long)]
        disable: bool,

        /// Hours between backups (1-168)
        #[arg(long)]
        interval: Option<u32>,

        /// Number of backups to keep (1-50)
        #[arg(long)]
        max_backups: Option<u32>,

        /// Backup directory (file backend only)
        #[arg(long, conflicts_with = "default_path")]
        path: Option<String>,

        /// Go back to the default backup directory
        #[arg(long)]
        default_path: bool,
    },

    /// List stored blobs that no backup record refers to
    Orphans,
}

/// Handle a backup command
pub async fn handle_backup_command(
    store: &Arc<BackupStore>,
    cmd: BackupCommands,
) -> BackupResult<()> {
    match cmd {
        BackupCommands::Run { period_secs } => {
            let shutdown = CancellationToken::new();
            let handle = BackupScheduler::new(Arc::clone(store))
                .with_period(Duration::from_secs(period_secs))
                .with_reload(true)
                .spawn(shutdown.clone());

            println!("Backup scheduler running every {}s. Press Ctrl-C to stop.", period_secs);
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| BackupError::Io(format!("Failed to listen for Ctrl-C: {}", e)))?;

            shutdown.cancel();
            let _ = handle.await;
            println!("Scheduler stopped.");
        }

        BackupCommands::Now => {
            println!("Creating backup...");
            let record = store.create_backup().await?;
            println!("Backup created: {}", record.file_name);
            println!("Location: {}", store.backend().location());
        }

        BackupCommands::List { verbose } => {
            let backups = store.list_backups().await;

            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: autobackup now");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            println!();

            for (i, backup) in backups.iter().rev().enumerate() {
                let age = Utc::now().signed_duration_since(backup.created_at());
                let age_str = format_duration(age);

                if verbose {
                    println!(
                        "{}. {}\n   Id: {}\n   Created: {}\n   Size: {}\n   Contents: {} sessions, {} messages\n   Age: {}\n",
                        i + 1,
                        backup.file_name,
                        backup.id,
                        backup.created_at().format("%Y-%m-%d %H:%M:%S UTC"),
                        format_size(backup.size),
                        backup.session_count,
                        backup.message_count,
                        age_str,
                    );
                } else {
                    println!(
                        "  {}. [{}] {} ({} ago, {})",
                        i + 1,
                        backup.id,
                        backup.file_name,
                        age_str,
                        format_size(backup.size),
                    );
                }
            }

            let status = store.status().await;
            println!();
            println!(
                "Total: {} backup(s), {}",
                backups.len(),
                format_size(status.total_size)
            );
        }

        BackupCommands::Status => {
            let status = store.status().await;

            println!("Auto Backup Status");
            println!("==================");
            println!("Enabled:     {}", if status.config.enabled { "Yes" } else { "No" });
            println!("Interval:    every {}h", status.config.interval_hours);
            println!("Keep:        {} backup(s)", status.config.max_backups);
            println!("Storage:     {} ({})", status.backend, status.location);
            println!(
                "Backups:     {} retained, {} of {}",
                status.backup_count,
                format_size(status.total_size),
                format_size(status.size_limit)
            );
            println!("Last backup: {}", format_last_backup(status.last_backup_time));
            println!("Next:        {}", describe_decision(&status.decision));
        }

        BackupCommands::Restore { backup, force } => {
            let record = resolve_backup(store, &backup).await?;

            println!("Backup Information");
            println!("==================");
            print_record(&record);
            println!();

            if !force {
                println!("WARNING: This will merge the backup into the current application state!");
                println!("To proceed, run again with --force flag:");
                println!("  autobackup restore {} --force", backup);
                return Ok(());
            }

            println!("Restoring from backup...");
            let outcome = store.restore_backup(&record.id).await?;

            println!("Restore complete!");
            println!(
                "Restored {} sessions with {} messages.",
                outcome.session_count, outcome.message_count
            );
            if outcome.requires_reload {
                println!("\nRestart the application to load the restored state.");
            }
        }

        BackupCommands::Export { backup, output } => {
            let record = resolve_backup(store, &backup).await?;
            let exported = store.export_backup(&record.id).await?;

            let destination = match output {
                Some(path) if path.is_dir() => path.join(&exported.file_name),
                Some(path) => path,
                None => PathBuf::from(&exported.file_name),
            };
            tokio::fs::write(&destination, &exported.content)
                .await
                .map_err(|e| BackupError::Io(format!("Failed to write export: {}", e)))?;

            println!("Exported {} to {}", exported.file_name, destination.display());
        }

        BackupCommands::Delete { backup, force } => {
            let record = resolve_backup(store, &backup).await?;

            if !force {
                print_record(&record);
                println!();
                println!("To delete this backup, run again with --force flag:");
                println!("  autobackup delete {} --force", backup);
                return Ok(());
            }

            store.delete_backup(&record.id).await?;
            println!("Deleted backup {}.", record.file_name);
        }

        BackupCommands::Clear { force } => {
            let count = store.list_backups().await.len();

            if count == 0 {
                println!("No backups to clear.");
                return Ok(());
            }

            if !force {
                println!("This will delete all {} backup(s).", count);
                println!("To proceed, run again with --force flag:");
                println!("  autobackup clear --force");
                return Ok(());
            }

            store.clear_all_backups().await?;
            println!("Deleted {} backup(s).", count);
        }

        BackupCommands::Config {
            enable,
            disable,
            interval,
            max_backups,
            path,
            default_path,
        } => {
            let update = SettingsUpdate {
                enabled: if enable {
                    Some(true)
                } else if disable {
                    Some(false)
                } else {
                    None
                },
                interval_hours: interval,
                max_backups,
                backup_path: if default_path { Some(None) } else { path.map(Some) },
            };

            let config = if update.is_empty() {
                store.settings().await
            } else {
                if interval.is_some_and(|h| h == 0 || h > MAX_INTERVAL_HOURS) {
                    println!("Note: interval clamped to 1-{} hours.", MAX_INTERVAL_HOURS);
                }
                if max_backups.is_some_and(|n| n == 0 || n > MAX_MAX_BACKUPS) {
                    println!("Note: backup count clamped to 1-{}.", MAX_MAX_BACKUPS);
                }
                store.update_settings(update).await?
            };

            println!("Backup Settings");
            println!("===============");
            println!("Enabled:  {}", config.enabled);
            println!("Interval: {}h", config.interval_hours);
            println!("Keep:     {}", config.max_backups);
            println!(
                "Path:     {}",
                config.backup_path.as_deref().unwrap_or("(default)")
            );
        }

        BackupCommands::Orphans => {
            let orphans = store.find_orphans().await?;

            if orphans.is_empty() {
                println!("No orphaned backup blobs.");
                return Ok(());
            }

            println!("Orphaned blobs in {}:", store.backend().location());
            for key in &orphans {
                println!("  {}", key);
            }
            println!();
            println!("Total: {} orphan(s)", orphans.len());
        }
    }

    Ok(())
}

/// Resolve a backup identifier to its record
async fn resolve_backup(store: &BackupStore, backup: &str) -> BackupResult<BackupRecord> {
    if backup.eq_ignore_ascii_case("latest") {
        return store
            .latest_backup()
            .await
            .ok_or_else(|| BackupError::backup_not_found("latest"));
    }

    if let Some(record) = store.get_backup(backup).await {
        return Ok(record);
    }

    // Accept a file name as well as an id
    store
        .list_backups()
        .await
        .into_iter()
        .find(|r| r.file_name == backup)
        .ok_or_else(|| BackupError::backup_not_found(backup))
}

fn print_record(record: &BackupRecord) {
    println!("File: {}", record.file_name);
    println!("Id: {}", record.id);
    println!(
        "Created: {}",
        record.created_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Size: {}", format_size(record.size));
    println!(
        "Contents: {} sessions, {} messages",
        record.session_count, record.message_count
    );
}

fn format_last_backup(timestamp: i64) -> String {
    if timestamp == 0 {
        return "never".to_string();
    }
    match chrono::DateTime::from_timestamp_millis(timestamp) {
        Some(at) => format!(
            "{} ({} ago)",
            at.format("%Y-%m-%d %H:%M:%S UTC"),
            format_duration(Utc::now().signed_duration_since(at))
        ),
        None => "unknown".to_string(),
    }
}

fn describe_decision(decision: &BackupDecision) -> String {
    match decision {
        BackupDecision::Due => "backup due now".to_string(),
        BackupDecision::IntervalNotElapsed { remaining_ms } => format!(
            "due in {}",
            format_duration(chrono::Duration::milliseconds(*remaining_ms))
        ),
        BackupDecision::Unchanged => "waiting for changes".to_string(),
        BackupDecision::SizeLimitExceeded { total_size, limit } => format!(
            "paused: {} retained exceeds the {} limit",
            format_size(*total_size),
            format_size(*limit)
        ),
        BackupDecision::ExportFailed(reason) => format!("cannot read application state: {}", reason),
    }
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

/// Format a byte count in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
