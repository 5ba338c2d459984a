//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/podclock/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/podclock/` (~/.config/podclock/)
//! - Data: `$XDG_DATA_HOME/podclock/` (~/.local/share/podclock/)
//! - State/Logs: `$XDG_STATE_HOME/podclock/` (~/.local/state/podclock/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Remote vault endpoint
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Scheduler and sync timing knobs
    #[serde(default)]
    pub timing: TimingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote vault endpoint configuration
///
/// The remote is a single POST endpoint. Without an endpoint the vault stays
/// local-only and every mutation simply remains dirty.
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// Endpoint URL (e.g., `https://script.example.com/exec`)
    pub endpoint: Option<String>,

    /// Hard request timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,

    /// Fixed salt appended to every signature preimage
    #[serde(default = "default_signing_salt")]
    pub salt: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_remote_timeout(),
            salt: default_signing_salt(),
        }
    }
}

impl RemoteConfig {
    /// Check if an endpoint is configured
    pub fn is_ready(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(());
        };

        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(Error::Config(format!(
                "remote.endpoint must be an http(s) URL, got {}",
                endpoint
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "remote.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.salt.is_empty() {
            return Err(Error::Config("remote.salt must not be empty".to_string()));
        }
        Ok(())
    }

    /// Request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_remote_timeout() -> u64 {
    45
}

fn default_signing_salt() -> String {
    "podclock-vault-v1".to_string()
}

/// Scheduler and sync timing configuration
///
/// All values are milliseconds unless the name says otherwise.
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    /// Look-ahead window: tasks due within this span are included in a claim
    #[serde(default = "default_claim_grace_ms")]
    pub claim_grace_ms: i64,

    /// Pre-due window flagged as urgent
    #[serde(default = "default_urgent_window_ms")]
    pub urgent_window_ms: i64,

    /// Default deferral between pressing claim and the external claim
    #[serde(default = "default_claim_offset_ms")]
    pub claim_offset_ms: i64,

    /// Delay between the vault turning dirty and the sync it triggers
    #[serde(default = "default_dirty_debounce_ms")]
    pub dirty_debounce_ms: u64,

    /// Delay between a mutation and the local store write
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,

    /// Heartbeat period in seconds
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Heartbeats are skipped for a clean vault synced more recently than this
    #[serde(default = "default_heartbeat_min_gap_secs")]
    pub heartbeat_min_gap_secs: u64,

    /// Hidden time after which regaining visibility forces a sync
    #[serde(default = "default_foreground_resync_secs")]
    pub foreground_resync_secs: u64,

    /// Readiness refresh cadence of the watch loop
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            claim_grace_ms: default_claim_grace_ms(),
            urgent_window_ms: default_urgent_window_ms(),
            claim_offset_ms: default_claim_offset_ms(),
            dirty_debounce_ms: default_dirty_debounce_ms(),
            persist_debounce_ms: default_persist_debounce_ms(),
            heartbeat_secs: default_heartbeat_secs(),
            heartbeat_min_gap_secs: default_heartbeat_min_gap_secs(),
            foreground_resync_secs: default_foreground_resync_secs(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl TimingConfig {
    pub fn dirty_debounce(&self) -> Duration {
        Duration::from_millis(self.dirty_debounce_ms)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(100))
    }

    /// Heartbeat suppression gap in milliseconds
    pub fn heartbeat_min_gap_ms(&self) -> i64 {
        (self.heartbeat_min_gap_secs as i64).saturating_mul(1000)
    }

    /// Foreground resync threshold in milliseconds
    pub fn foreground_resync_ms(&self) -> i64 {
        (self.foreground_resync_secs as i64).saturating_mul(1000)
    }
}

fn default_claim_grace_ms() -> i64 {
    10_000
}

fn default_urgent_window_ms() -> i64 {
    300_000
}

fn default_claim_offset_ms() -> i64 {
    10_000
}

fn default_dirty_debounce_ms() -> u64 {
    5_000
}

fn default_persist_debounce_ms() -> u64 {
    2_000
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_heartbeat_min_gap_secs() -> u64 {
    60
}

fn default_foreground_resync_secs() -> u64 {
    60
}

fn default_tick_ms() -> u64 {
    1_000
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.remote.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/podclock/config.toml` (~/.config/podclock/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("podclock").join("config.toml")
    }

    /// Returns the data directory path (for the vault store)
    ///
    /// `$XDG_DATA_HOME/podclock/` (~/.local/share/podclock/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("podclock")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/podclock/` (~/.local/state/podclock/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("podclock")
    }

    /// Returns the vault store path
    ///
    /// `$XDG_DATA_HOME/podclock/vault.db` (~/.local/share/podclock/vault.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("vault.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/podclock/podclock.log` (~/.local/state/podclock/podclock.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join(crate::logging::LOG_FILE_PREFIX)
    }

    /// Set unset XDG variables to their defaults.
    ///
    /// Call once at startup, before any threads exist, so every component
    /// resolves the same directories.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
