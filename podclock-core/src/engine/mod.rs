//! The engine ties the vault to its side effects.
//!
//! [`Engine`] owns the [`VaultHandle`], the optional remote client, the
//! optional local store and the debounce timers. All callers mutate through
//! [`Engine::dispatch`], which schedules:
//!
//! - a debounced write of the persisted fields to the local store
//! - a debounced `Dirty` sync after any local mutation
//!
//! Claims live in [`claim`], reconciliation in [`sync`], account
//! lifecycle in [`account`].

pub mod account;
pub mod claim;
pub mod sync;

pub use claim::ClaimFlight;
pub use sync::{SkipReason, SyncOutcome, SyncStatus, SyncTrigger};

use std::sync::{Arc, Weak};

use crate::clock::Clock;
use crate::config::TimingConfig;
use crate::db::VaultStore;
use crate::debounce::DelayedTask;
use crate::error::Result;
use crate::remote::{RemoteClient, RemoteTransport};
use crate::types::Vault;
use crate::vault::{Action, Dispatched, VaultHandle};

use sync::SyncState;

/// Vault plus persistence and reconciliation.
pub struct Engine<T> {
    vault: VaultHandle,
    remote: Option<RemoteClient<T>>,
    store: Option<Arc<VaultStore>>,
    clock: Arc<dyn Clock>,
    timing: TimingConfig,
    sync_state: SyncState,
    persist_task: DelayedTask,
    dirty_task: DelayedTask,
}

impl<T: RemoteTransport + 'static> Engine<T> {
    /// A local-only engine with an empty vault.
    pub fn new(clock: Arc<dyn Clock>, timing: TimingConfig) -> Self {
        let persist_task = DelayedTask::new("persist", timing.persist_debounce());
        let dirty_task = DelayedTask::new("dirty-sync", timing.dirty_debounce());
        Self {
            vault: VaultHandle::default(),
            remote: None,
            store: None,
            clock,
            timing,
            sync_state: SyncState::default(),
            persist_task,
            dirty_task,
        }
    }

    pub fn with_remote(mut self, remote: RemoteClient<T>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_store(mut self, store: Arc<VaultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_vault(mut self, vault: Vault) -> Self {
        self.vault = VaultHandle::new(vault);
        self
    }

    pub fn vault(&self) -> &VaultHandle {
        &self.vault
    }

    pub fn snapshot(&self) -> Vault {
        self.vault.snapshot()
    }

    pub fn remote(&self) -> Option<&RemoteClient<T>> {
        self.remote.as_ref()
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Load the persisted vault from the store, if there is one.
    ///
    /// A maintenance marker left by an earlier process is restored too.
    /// Returns true if a stored vault was found.
    pub fn hydrate_from_store(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let found = match store.load()? {
            Some(persisted) => {
                self.vault.dispatch(Action::Hydrate(persisted))?;
                self.vault.restore_undo(store.load_undo()?);
                let (pods, tasks, dirty) =
                    self.vault.read(|v| (v.pods.len(), v.tasks.len(), v.is_dirty));
                tracing::info!(pods, tasks, dirty, "Vault hydrated from store");
                true
            }
            None => {
                tracing::info!("No stored vault, starting empty");
                false
            }
        };
        if let Some(since) = store.load_maintenance()? {
            tracing::info!(since, "Remote was in maintenance mode, edits stay paused");
            self.mark(Action::SetMaintenance(true));
        }
        Ok(found)
    }

    /// Apply an action and schedule its side effects.
    ///
    /// User edits fail with [`Error::Maintenance`](crate::error::Error::Maintenance)
    /// while the remote is in maintenance mode.
    pub fn dispatch(self: &Arc<Self>, action: Action) -> Result<Dispatched> {
        if let Action::SetMaintenance(on) = action {
            self.set_maintenance(on);
            return Ok(Dispatched {
                revision: self.vault.revision(),
                ..Dispatched::none()
            });
        }
        let outcome = self.vault.dispatch(action)?;
        if outcome.persist {
            self.schedule_persist();
        }
        if outcome.mutated {
            self.schedule_dirty_sync();
        }
        Ok(outcome)
    }

    /// Write the persisted fields to the store now.
    pub fn persist_now(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let now = self.clock.now_ms();
        let persisted = self.vault.read(Vault::to_persisted);
        store.save(&persisted, now)?;
        store.save_undo(self.vault.undo_entry().as_ref(), now)
    }

    fn persist_logged(&self) {
        if let Err(e) = self.persist_now() {
            tracing::error!(error = %e, "Failed to persist vault");
        }
    }

    pub(crate) fn schedule_persist(self: &Arc<Self>) {
        let engine = Arc::downgrade(self);
        self.persist_task.schedule(async move {
            if let Some(engine) = Weak::upgrade(&engine) {
                engine.persist_logged();
            }
        });
    }

    /// Arm the `Dirty` sync. A flight that ends with changes still
    /// outstanding arms it again.
    pub(crate) fn schedule_dirty_sync(self: &Arc<Self>) {
        if self.remote.is_none() {
            return;
        }
        let engine = Arc::downgrade(self);
        self.dirty_task.schedule(async move {
            let Some(engine) = Weak::upgrade(&engine) else {
                return;
            };
            engine.sync(SyncTrigger::Dirty).await;
            if engine.take_follow_up() {
                tracing::debug!("Re-arming dirty sync");
                engine.schedule_dirty_sync();
            }
        });
    }

    /// Cancel pending timers and write the vault out.
    ///
    /// Call before the process exits; debounced writes would otherwise be
    /// lost.
    pub fn shutdown(&self) -> Result<()> {
        self.dirty_task.cancel();
        self.persist_task.cancel();
        self.persist_now()
    }
}

impl<T> std::fmt::Debug for Engine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("revision", &self.vault.revision())
            .field("remote", &self.remote.is_some())
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
