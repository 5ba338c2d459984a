//! # podclock-core
//!
//! Core library for podclock - a tracker for recurring reward-claim cycles
//! of third-party apps.
//!
//! This library provides:
//! - Domain types for pods, tasks and the vault
//! - The cycle clock and readiness classifier
//! - A single-writer vault controller
//! - Optimistic claims and a sync reconciler against a signed remote RPC
//! - Local storage with SQLite
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! State flows in one direction:
//! - **Actions** are dispatched to the [`vault::VaultController`], the only
//!   writer of the [`Vault`]
//! - **Side effects** (store writes, syncs) are scheduled by the
//!   [`Engine`] after each dispatch
//! - **Readiness** is derived from task due times on every read, never
//!   stored
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use podclock_core::{Config, Engine, HttpTransport, SystemClock, VaultStore};
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let store = VaultStore::open(&Config::database_path()).expect("failed to open store");
//! store.migrate().expect("failed to run migrations");
//!
//! let engine: Engine<HttpTransport> =
//!     Engine::new(Arc::new(SystemClock), config.timing.clone()).with_store(Arc::new(store));
//! engine.hydrate_from_store().expect("failed to load vault");
//! ```

// Re-export commonly used items at the crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::VaultStore;
pub use engine::{Engine, SkipReason, SyncOutcome, SyncStatus, SyncTrigger};
pub use error::{Error, Result};
pub use remote::{HttpTransport, RemoteClient, RemoteResponse, RemoteTransport};
pub use schedule::readiness::{ready_queue, PodReadiness};
pub use types::*;
pub use vault::{Action, VaultHandle};

// Public modules
pub mod clock;
pub mod config;
pub mod db;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod logging;
pub mod remote;
pub mod schedule;
pub mod signer;
pub mod types;
pub mod vault;
