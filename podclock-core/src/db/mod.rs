//! Local durable storage for podclock
//!
//! The vault is persisted as one JSON blob in a SQLite key/value table:
//! - Schema migrations via `PRAGMA user_version`
//! - Allow-listed vault fields only (see [`crate::types::PersistedVault`])
//! - Corrupt blobs are logged and ignored, never fatal

pub mod schema;
pub mod store;

pub use store::{VaultStore, MAINTENANCE_KEY, UNDO_KEY, VAULT_KEY};
