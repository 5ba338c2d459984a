//! Vault blob storage
//!
//! One row per key in the `kv` table; the vault lives under [`VAULT_KEY`].

use crate::error::Result;
use crate::types::PersistedVault;
use crate::vault::UndoEntry;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Fixed key of the persisted vault blob
pub const VAULT_KEY: &str = "vault";

/// Key of the pending undo snapshot, absent when there is nothing to undo
pub const UNDO_KEY: &str = "undo";

/// Time the remote was first seen in maintenance mode, absent otherwise
pub const MAINTENANCE_KEY: &str = "maintenance";

/// SQLite-backed store for the persisted vault.
pub struct VaultStore {
    conn: Mutex<Connection>,
}

impl VaultStore {
    /// Open (or create) the store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this store
    pub fn migrate(&self) -> Result<()> {
        super::schema::run_migrations(&self.conn())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the vault blob, replacing any previous one
    pub fn save(&self, vault: &PersistedVault, now: i64) -> Result<()> {
        let json = serde_json::to_string(vault)?;
        self.put(VAULT_KEY, &json, now)?;
        tracing::debug!(
            bytes = json.len(),
            pods = vault.pods.len(),
            tasks = vault.tasks.len(),
            dirty = vault.is_dirty,
            "Vault persisted"
        );
        Ok(())
    }

    /// Read the vault blob.
    ///
    /// Returns `None` when nothing is stored or the stored blob does not
    /// parse; a corrupt blob is logged and left in place for inspection.
    pub fn load(&self) -> Result<Option<PersistedVault>> {
        let Some(raw) = self.get(VAULT_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str::<PersistedVault>(&raw) {
            Ok(vault) => Ok(Some(vault)),
            Err(e) => {
                tracing::warn!(error = %e, bytes = raw.len(), "Ignoring malformed vault blob");
                Ok(None)
            }
        }
    }

    /// Remove the vault blob, undo snapshot and maintenance marker
    /// (logout / account deletion)
    pub fn clear(&self) -> Result<()> {
        self.delete(VAULT_KEY)?;
        self.delete(UNDO_KEY)?;
        self.delete(MAINTENANCE_KEY)?;
        tracing::info!("Vault blob cleared");
        Ok(())
    }

    /// Write or remove the undo snapshot
    pub fn save_undo(&self, entry: Option<&UndoEntry>, now: i64) -> Result<()> {
        match entry {
            Some(entry) => self.put(UNDO_KEY, &serde_json::to_string(entry)?, now),
            None => self.delete(UNDO_KEY),
        }
    }

    /// Read the undo snapshot; a malformed one is dropped
    pub fn load_undo(&self) -> Result<Option<UndoEntry>> {
        let Some(raw) = self.get(UNDO_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed undo snapshot");
                self.delete(UNDO_KEY)?;
                Ok(None)
            }
        }
    }

    /// Record when maintenance mode started, or clear the marker
    pub fn save_maintenance(&self, since: Option<i64>, now: i64) -> Result<()> {
        match since {
            Some(since) => self.put(MAINTENANCE_KEY, &since.to_string(), now),
            None => self.delete(MAINTENANCE_KEY),
        }
    }

    /// When maintenance mode started, if the marker is set
    pub fn load_maintenance(&self) -> Result<Option<i64>> {
        let Some(raw) = self.get(MAINTENANCE_KEY)? else {
            return Ok(None);
        };
        match raw.parse() {
            Ok(since) => Ok(Some(since)),
            Err(e) => {
                // Unreadable marker still means maintenance was seen.
                tracing::warn!(error = %e, "Malformed maintenance marker");
                Ok(Some(0))
            }
        }
    }

    /// Remove a key
    pub fn delete(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Raw value for a key
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Insert or replace a raw value
    pub fn put(&self, key: &str, value: &str, now: i64) -> Result<()> {
        self.conn().execute(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, now],
        )?;
        Ok(())
    }
}
