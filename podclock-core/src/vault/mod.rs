//! The vault controller: one serialized writer for all user state.
//!
//! Every mutation is an [`Action`] applied by [`VaultController::dispatch`].
//! Nothing else holds a `&mut Vault`, so concurrent callers cannot produce
//! torn writes. The controller also tracks:
//!
//! - a `revision` bumped by every local mutation, used to detect remote
//!   responses that were computed against an older vault
//! - at most one [`UndoEntry`], set by a delete and cleared by the next
//!   mutation or by [`Action::Undo`]

mod action;

pub use action::{Action, Dispatched, NewPod, NewTask, UndoEntry, UndoOperation};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::schedule::{compute_next_due_at, next_due_for};
use crate::types::{HistoryEntry, Pod, Task, Vault, HISTORY_LIMIT};

/// Owner of the [`Vault`].
#[derive(Debug, Default)]
pub struct VaultController {
    vault: Vault,
    revision: u64,
    undo: Option<UndoEntry>,
}

impl VaultController {
    pub fn new(vault: Vault) -> Self {
        Self {
            vault,
            revision: 0,
            undo: None,
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn undo_entry(&self) -> Option<&UndoEntry> {
        self.undo.as_ref()
    }

    /// Reinstate an undo entry saved by an earlier process.
    pub fn restore_undo(&mut self, entry: Option<UndoEntry>) {
        self.undo = entry;
    }

    /// Apply one action.
    ///
    /// On error the vault is unchanged. User edits fail with
    /// [`Error::Maintenance`] while the maintenance flag is set.
    pub fn dispatch(&mut self, action: Action) -> Result<Dispatched> {
        let name = action.name();
        if self.vault.maintenance && action.is_user_edit() {
            tracing::debug!(action = name, "Vault action refused during maintenance");
            return Err(Error::Maintenance);
        }
        let mut outcome = self.apply(action).map_err(|e| {
            tracing::debug!(action = name, error = %e, "Vault action rejected");
            e
        })?;
        if outcome.mutated {
            self.revision += 1;
            self.vault.is_dirty = true;
            tracing::debug!(action = name, revision = self.revision, "Vault mutated");
        }
        outcome.revision = self.revision;
        Ok(outcome)
    }

    fn apply(&mut self, action: Action) -> Result<Dispatched> {
        match action {
            Action::AddPod { pod, now } => {
                let name = non_empty(pod.name, "pod name")?;
                if self.vault.pod(&pod.id).is_some() {
                    return Err(Error::Validation(format!("pod {} already exists", pod.id)));
                }
                self.undo = None;
                self.vault.pods.push(Pod {
                    id: pod.id,
                    name,
                    icon: pod.icon,
                    launch_url: pod.launch_url,
                    created_at: now,
                });
                Ok(Dispatched::mutation())
            }

            Action::UpdatePod {
                pod_id,
                name,
                icon,
                launch_url,
            } => {
                let name = name.map(|n| non_empty(n, "pod name")).transpose()?;
                let pod = self
                    .vault
                    .pods
                    .iter_mut()
                    .find(|p| p.id == pod_id)
                    .ok_or(Error::PodNotFound(pod_id))?;
                if let Some(name) = name {
                    pod.name = name;
                }
                if icon.is_some() {
                    pod.icon = icon;
                }
                if launch_url.is_some() {
                    pod.launch_url = launch_url;
                }
                self.undo = None;
                Ok(Dispatched::mutation())
            }

            Action::DeletePod { pod_id } => {
                let index = self
                    .vault
                    .pods
                    .iter()
                    .position(|p| p.id == pod_id)
                    .ok_or_else(|| Error::PodNotFound(pod_id.clone()))?;
                let pod = self.vault.pods.remove(index);
                let (removed, kept): (Vec<Task>, Vec<Task>) = std::mem::take(&mut self.vault.tasks)
                    .into_iter()
                    .partition(|t| t.pod_id == pod_id);
                self.vault.tasks = kept;
                if self.vault.editing_pod_id.as_deref() == Some(pod_id.as_str()) {
                    self.vault.editing_pod_id = None;
                }
                self.undo = Some(UndoEntry {
                    operation: UndoOperation::DeletePod,
                    pods: vec![pod],
                    tasks: removed,
                });
                Ok(Dispatched::mutation())
            }

            Action::AddTask { task, now } => {
                let name = non_empty(task.name, "task name")?;
                if self.vault.pod(&task.pod_id).is_none() {
                    return Err(Error::PodNotFound(task.pod_id));
                }
                if self.vault.task(&task.id).is_some() {
                    return Err(Error::Validation(format!("task {} already exists", task.id)));
                }
                let next_due_at =
                    compute_next_due_at(task.policy, task.custom_hours, task.custom_minutes, now);
                self.undo = None;
                self.vault.tasks.push(Task {
                    id: task.id,
                    pod_id: task.pod_id,
                    name,
                    policy: task.policy,
                    custom_hours: task.custom_hours,
                    custom_minutes: task.custom_minutes,
                    next_due_at,
                    streak: 0,
                    efficiency: 0,
                    last_completed_at: None,
                    notification_enabled: task.notification_enabled,
                });
                Ok(Dispatched::mutation())
            }

            Action::UpdateTask {
                task_id,
                patch,
                now,
            } => {
                if let Some(name) = &patch.name {
                    non_empty(name.clone(), "task name")?;
                }
                let task = self.task_mut(&task_id)?;
                if patch.apply(task) {
                    // Realign from the last claim so an edited duration
                    // takes effect immediately.
                    let from = task.last_completed_at.unwrap_or(now);
                    task.next_due_at = next_due_for(task, from);
                }
                self.undo = None;
                Ok(Dispatched::mutation())
            }

            Action::DeleteTask { task_id } => {
                let index = self
                    .vault
                    .tasks
                    .iter()
                    .position(|t| t.id == task_id)
                    .ok_or(Error::TaskNotFound(task_id))?;
                let task = self.vault.tasks.remove(index);
                self.undo = Some(UndoEntry {
                    operation: UndoOperation::DeleteTask,
                    pods: vec![],
                    tasks: vec![task],
                });
                Ok(Dispatched::mutation())
            }

            Action::ResetTask { task_id, now } => {
                self.task_mut(&task_id)?.next_due_at = now;
                self.undo = None;
                Ok(Dispatched::mutation())
            }

            Action::AlignTask { task_id, now } => {
                let task = self.task_mut(&task_id)?;
                task.next_due_at = next_due_for(task, now);
                self.undo = None;
                Ok(Dispatched::mutation())
            }

            Action::ClaimPod {
                pod_id,
                now,
                offset_ms,
                grace_ms,
            } => self.claim(&pod_id, now, offset_ms, grace_ms),

            Action::Undo => {
                let entry = self
                    .undo
                    .take()
                    .ok_or_else(|| Error::Validation("nothing to undo".to_string()))?;
                for pod in entry.pods {
                    if self.vault.pod(&pod.id).is_none() {
                        self.vault.pods.push(pod);
                    }
                }
                for task in entry.tasks {
                    if self.vault.task(&task.id).is_none() {
                        self.vault.tasks.push(task);
                    }
                }
                Ok(Dispatched::mutation())
            }

            Action::SetPreferences(preferences) => {
                if self.vault.preferences == preferences {
                    return Ok(Dispatched::none());
                }
                self.vault.preferences = preferences;
                Ok(Dispatched::mutation())
            }

            Action::SetIdentity {
                account_id,
                nickname,
                hashed_pin,
            } => {
                self.vault.account_id = Some(non_empty(account_id, "account id")?);
                self.vault.nickname = Some(non_empty(nickname, "nickname")?);
                self.vault.hashed_pin = Some(hashed_pin);
                Ok(Dispatched::mutation())
            }

            Action::ApplyServer {
                patch,
                base_revision,
                now,
            } => {
                if base_revision != self.revision {
                    tracing::info!(
                        base_revision,
                        revision = self.revision,
                        "Dropping remote vault computed against an older revision"
                    );
                    return Ok(Dispatched {
                        stale: true,
                        ..Dispatched::none()
                    });
                }
                self.vault.apply_patch(patch);
                self.vault.is_dirty = false;
                self.vault.last_synced_at = Some(now);
                Ok(Dispatched::persisted())
            }

            Action::Hydrate(persisted) => {
                let maintenance = self.vault.maintenance;
                self.vault = Vault::from_persisted(persisted);
                self.vault.maintenance = maintenance;
                self.undo = None;
                // In-flight responses predate the hydrated state.
                self.revision += 1;
                Ok(Dispatched::persisted())
            }

            Action::SetMaintenance(on) => {
                self.vault.maintenance = on;
                Ok(Dispatched::none())
            }

            Action::SetSyncing(on) => {
                self.vault.is_syncing = on;
                Ok(Dispatched::none())
            }

            Action::SetEditing(pod_id) => {
                self.vault.editing_pod_id = pod_id;
                Ok(Dispatched::none())
            }

            Action::Wipe => {
                self.vault = Vault::default();
                self.undo = None;
                self.revision += 1;
                Ok(Dispatched::none())
            }
        }
    }

    fn claim(&mut self, pod_id: &str, now: i64, offset_ms: i64, grace_ms: i64) -> Result<Dispatched> {
        let pod_name = self
            .vault
            .pod(pod_id)
            .map(|p| p.name.clone())
            .ok_or_else(|| Error::PodNotFound(pod_id.to_string()))?;

        let horizon = now + grace_ms;
        let reference = now + offset_ms;
        let mut claimed = Vec::new();

        for task in self
            .vault
            .tasks
            .iter_mut()
            .filter(|t| t.pod_id == pod_id && t.next_due_at <= horizon)
        {
            task.next_due_at = next_due_for(task, reference);
            task.streak = task.streak.saturating_add(1);
            task.last_completed_at = Some(reference);
            claimed.push(task.id.clone());
        }

        if claimed.is_empty() {
            return Ok(Dispatched::none());
        }

        self.vault.history.insert(
            0,
            HistoryEntry {
                pod_id: pod_id.to_string(),
                pod_name,
                task_ids: claimed.clone(),
                claimed_at: reference,
            },
        );
        self.vault.history.truncate(HISTORY_LIMIT);
        self.undo = None;

        Ok(Dispatched {
            claimed,
            ..Dispatched::mutation()
        })
    }

    fn task_mut(&mut self, task_id: &str) -> Result<&mut Task> {
        self.vault
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }
}

fn non_empty(value: String, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

/// Shared handle to the controller.
///
/// The lock is held for one dispatch or one read, never across an await.
#[derive(Debug, Clone, Default)]
pub struct VaultHandle {
    inner: Arc<Mutex<VaultController>>,
}

impl VaultHandle {
    pub fn new(vault: Vault) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VaultController::new(vault))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VaultController> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatch(&self, action: Action) -> Result<Dispatched> {
        self.lock().dispatch(action)
    }

    /// Run `f` against the current vault.
    pub fn read<R>(&self, f: impl FnOnce(&Vault) -> R) -> R {
        f(self.lock().vault())
    }

    /// Run `f` against the vault and its revision under one lock.
    pub fn read_with_revision<R>(&self, f: impl FnOnce(&Vault, u64) -> R) -> R {
        let guard = self.lock();
        f(guard.vault(), guard.revision())
    }

    pub fn snapshot(&self) -> Vault {
        self.read(Vault::clone)
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision()
    }

    pub fn undo_entry(&self) -> Option<UndoEntry> {
        self.lock().undo_entry().cloned()
    }

    pub fn restore_undo(&self, entry: Option<UndoEntry>) {
        self.lock().restore_undo(entry);
    }
}
