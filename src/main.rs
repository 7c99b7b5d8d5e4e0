use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use autobackup::app_state::JsonFileAppState;
use autobackup::backup::BackupStore;
use autobackup::cli::{handle_backup_command, BackupCommands};
use autobackup::config::{BackupDocument, BackupPaths};
use autobackup::storage::{select_backend, HostEnvironment};

#[derive(Parser)]
#[command(
    name = "autobackup",
    version,
    about = "Automatic rolling backups of application state",
    long_about = "autobackup periodically snapshots the application state when it has \
                  changed, keeps a bounded history of backups on disk or in a key-value \
                  store, and restores or exports any retained backup."
)]
struct Cli {
    /// Data directory for settings and the key-value store
    #[arg(long, global = true, env = "AUTOBACKUP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Storage backend to use
    #[arg(long, global = true, value_enum, default_value_t = BackendChoice::Auto)]
    backend: BackendChoice,

    /// Application state file to back up and restore into
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendChoice {
    /// Files when a filesystem is available
    Auto,
    /// One JSON file per backup
    File,
    /// A single key-value store file
    Kv,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Backup(BackupCommands),

    /// Show data paths
    Paths,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autobackup=info")),
        )
        .init();

    let cli = Cli::parse();

    // Initialize paths and settings
    let paths = match cli.data_dir {
        Some(dir) => BackupPaths::with_base_dir(dir),
        None => BackupPaths::new()?,
    };
    paths.ensure_directories()?;
    let document = BackupDocument::load_or_create(&paths.settings_file())?;

    let host = match cli.backend {
        BackendChoice::Auto => HostEnvironment::detect(),
        BackendChoice::File => HostEnvironment { native_fs: true },
        BackendChoice::Kv => HostEnvironment { native_fs: false },
    };
    let backend = select_backend(host, &document.config, &paths);

    let state_file = cli.state.unwrap_or_else(|| paths.app_state_file());
    let app = Arc::new(JsonFileAppState::new(state_file.clone()));

    let store = Arc::new(
        BackupStore::new(backend, app.clone(), app, document)
            .with_persistence(paths.settings_file()),
    );

    match cli.command {
        Some(Commands::Backup(cmd)) => {
            handle_backup_command(&store, cmd).await?;
        }
        Some(Commands::Paths) => {
            println!("autobackup Paths");
            println!("================");
            println!("Data directory:   {}", paths.base_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!("Application state: {}", state_file.display());
            println!("Backup storage:   {}", store.backend().location());
        }
        None => {
            println!("autobackup - automatic rolling backups");
            println!();
            println!("Run 'autobackup --help' for usage information.");
            println!("Run 'autobackup run' to start the scheduler.");
        }
    }

    Ok(())
}
