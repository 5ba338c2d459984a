//! podclock - reward claim cycle tracker
//!
//! Tracks recurring claim cycles of third-party apps, claims them
//! optimistically and keeps the vault in sync with the remote endpoint.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Vault store: $XDG_DATA_HOME/podclock/vault.db (~/.local/share/podclock/vault.db)
//! - Logs: $XDG_STATE_HOME/podclock/podclock.log (~/.local/state/podclock/podclock.log)
//! - Config: $XDG_CONFIG_HOME/podclock/config.toml (~/.config/podclock/config.toml)

mod commands;
mod process_lock;
mod render;
mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use podclock_core::{Config, Engine, HttpTransport, RemoteClient, SystemClock, VaultStore};

use crate::process_lock::acquire_vault_lock;

/// The engine as wired by the CLI.
pub type App = Engine<HttpTransport>;

#[derive(Parser)]
#[command(name = "podclock")]
#[command(about = "Track recurring reward claim cycles")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the ready queue (default)
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a pod
    AddPod {
        name: String,
        #[arg(long)]
        icon: Option<String>,
        /// URL used to open the app
        #[arg(long)]
        url: Option<String>,
    },
    /// Rename a pod or change its icon or URL
    EditPod {
        /// Pod id or name
        pod: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Remove a pod and its tasks
    RemovePod {
        /// Pod id or name
        pod: String,
    },
    /// Add a task to a pod
    AddTask {
        /// Pod id or name
        pod: String,
        name: String,
        /// sliding, fixed-daily or window
        #[arg(long, default_value = "sliding")]
        policy: String,
        #[arg(long)]
        hours: Option<u32>,
        #[arg(long)]
        minutes: Option<u32>,
        /// Disable ready notifications for this task
        #[arg(long)]
        no_notify: bool,
    },
    /// Change a task's name or schedule
    EditTask {
        /// Task id or name
        task: String,
        /// Pod id or name, to disambiguate task names
        #[arg(long)]
        pod: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        policy: Option<String>,
        #[arg(long)]
        hours: Option<u32>,
        #[arg(long)]
        minutes: Option<u32>,
        /// Enable or disable ready notifications
        #[arg(long)]
        notify: Option<bool>,
    },
    /// Remove a task
    RemoveTask {
        task: String,
        #[arg(long)]
        pod: Option<String>,
    },
    /// Make a task due now
    ResetTask {
        task: String,
        #[arg(long)]
        pod: Option<String>,
    },
    /// Recompute a task's due time from now
    AlignTask {
        task: String,
        #[arg(long)]
        pod: Option<String>,
    },
    /// Restore whatever the last remove deleted
    Undo,
    /// Claim every due task of a pod
    Claim {
        /// Pod id or name
        pod: String,
        /// Deferral before the external claim happens (ms)
        #[arg(long)]
        offset_ms: Option<i64>,
    },
    /// Change preference flags
    Prefs {
        #[arg(long)]
        haptics: Option<bool>,
        #[arg(long)]
        sound: Option<bool>,
        #[arg(long)]
        compact: Option<bool>,
    },
    /// Create an account for this vault
    Register {
        nickname: String,
        #[arg(long, env = "PODCLOCK_PIN", hide_env_values = true)]
        pin: String,
    },
    /// Replace this vault with an existing account
    Login {
        nickname: String,
        #[arg(long, env = "PODCLOCK_PIN", hide_env_values = true)]
        pin: String,
    },
    /// Forget the account and all local data
    Logout,
    /// Sync with the remote now
    Sync,
    /// Live board with heartbeat syncs until Ctrl-C
    Watch,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Status { .. } => "status",
            Command::AddPod { .. } => "add-pod",
            Command::EditPod { .. } => "edit-pod",
            Command::RemovePod { .. } => "remove-pod",
            Command::AddTask { .. } => "add-task",
            Command::EditTask { .. } => "edit-task",
            Command::RemoveTask { .. } => "remove-task",
            Command::ResetTask { .. } => "reset-task",
            Command::AlignTask { .. } => "align-task",
            Command::Undo => "undo",
            Command::Claim { .. } => "claim",
            Command::Prefs { .. } => "prefs",
            Command::Register { .. } => "register",
            Command::Login { .. } => "login",
            Command::Logout => "logout",
            Command::Sync => "sync",
            Command::Watch => "watch",
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Status { json: false });

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        podclock_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(command = command.name(), "podclock starting");

    // One process owns the vault at a time.
    let db_path = Config::database_path();
    let _vault_lock = acquire_vault_lock(&db_path).context("failed to acquire process lock")?;

    tracing::info!(path = %db_path.display(), "Opening vault store");
    let store = VaultStore::open(&db_path).context("failed to open vault store")?;
    store.migrate().context("failed to run store migrations")?;

    let mut engine: App =
        Engine::new(Arc::new(SystemClock), config.timing.clone()).with_store(Arc::new(store));
    if config.remote.is_ready() {
        let transport =
            HttpTransport::new(&config.remote).context("failed to create remote client")?;
        engine = engine.with_remote(RemoteClient::new(transport, config.remote.salt.clone()));
        tracing::info!(
            endpoint = %config.remote.endpoint.as_deref().unwrap_or(""),
            "Remote sync enabled"
        );
    }
    let engine = Arc::new(engine);
    engine.hydrate_from_store().context("failed to load vault")?;

    let result = commands::run(&engine, command).await;

    // Flush debounced writes even when the command failed.
    engine.shutdown().context("failed to persist vault")?;
    tracing::info!("podclock exiting");

    result
}
