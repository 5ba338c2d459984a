//! Typed vault mutations.

use serde::{Deserialize, Serialize};

use crate::types::{
    PersistedVault, Pod, Preferences, RecurrencePolicy, Task, TaskPatch, VaultPatch,
};

/// Input for creating a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPod {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub launch_url: Option<String>,
}

impl NewPod {
    /// A pod with a freshly generated id.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            icon: None,
            launch_url: None,
        }
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub id: String,
    pub pod_id: String,
    pub name: String,
    pub policy: RecurrencePolicy,
    pub custom_hours: Option<u32>,
    pub custom_minutes: Option<u32>,
    pub notification_enabled: bool,
}

impl NewTask {
    /// A task with a freshly generated id and the given schedule.
    pub fn new(
        pod_id: impl Into<String>,
        name: impl Into<String>,
        policy: RecurrencePolicy,
        custom_hours: Option<u32>,
        custom_minutes: Option<u32>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pod_id: pod_id.into(),
            name: name.into(),
            policy,
            custom_hours,
            custom_minutes,
            notification_enabled: true,
        }
    }
}

/// Every way the vault can change.
///
/// Timestamps are passed in rather than read inside the reducer so that a
/// dispatch is a pure function of (vault, action).
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddPod { pod: NewPod, now: i64 },
    UpdatePod {
        pod_id: String,
        name: Option<String>,
        icon: Option<String>,
        launch_url: Option<String>,
    },
    /// Removes the pod and its tasks; the removed data becomes undoable.
    DeletePod { pod_id: String },
    AddTask { task: NewTask, now: i64 },
    UpdateTask { task_id: String, patch: TaskPatch, now: i64 },
    DeleteTask { task_id: String },
    /// Make a task due immediately.
    ResetTask { task_id: String, now: i64 },
    /// Recompute a task's due time from `now` (sync alignment).
    AlignTask { task_id: String, now: i64 },
    /// Advance every task of the pod due within `grace_ms` of `now`.
    ClaimPod {
        pod_id: String,
        now: i64,
        offset_ms: i64,
        grace_ms: i64,
    },
    /// Restore whatever the last delete removed.
    Undo,
    SetPreferences(Preferences),
    SetIdentity {
        account_id: String,
        nickname: String,
        hashed_pin: String,
    },
    /// Authoritative remote state captured when the vault was at
    /// `base_revision`.
    ApplyServer {
        patch: VaultPatch,
        base_revision: u64,
        now: i64,
    },
    /// Replace the persisted fields wholesale (startup hydration, login).
    Hydrate(PersistedVault),
    SetMaintenance(bool),
    SetSyncing(bool),
    SetEditing(Option<String>),
    /// Drop everything (logout / account deletion).
    Wipe,
}

impl Action {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::AddPod { .. } => "add_pod",
            Action::UpdatePod { .. } => "update_pod",
            Action::DeletePod { .. } => "delete_pod",
            Action::AddTask { .. } => "add_task",
            Action::UpdateTask { .. } => "update_task",
            Action::DeleteTask { .. } => "delete_task",
            Action::ResetTask { .. } => "reset_task",
            Action::AlignTask { .. } => "align_task",
            Action::ClaimPod { .. } => "claim_pod",
            Action::Undo => "undo",
            Action::SetPreferences(_) => "set_preferences",
            Action::SetIdentity { .. } => "set_identity",
            Action::ApplyServer { .. } => "apply_server",
            Action::Hydrate(_) => "hydrate",
            Action::SetMaintenance(_) => "set_maintenance",
            Action::SetSyncing(_) => "set_syncing",
            Action::SetEditing(_) => "set_editing",
            Action::Wipe => "wipe",
        }
    }

    /// Edits a user makes to their own vault. These are refused while the
    /// remote is in maintenance mode.
    pub fn is_user_edit(&self) -> bool {
        matches!(
            self,
            Action::AddPod { .. }
                | Action::UpdatePod { .. }
                | Action::DeletePod { .. }
                | Action::AddTask { .. }
                | Action::UpdateTask { .. }
                | Action::DeleteTask { .. }
                | Action::ResetTask { .. }
                | Action::AlignTask { .. }
                | Action::ClaimPod { .. }
                | Action::Undo
                | Action::SetPreferences(_)
        )
    }
}

/// What a delete removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UndoOperation {
    DeletePod,
    DeleteTask,
}

/// Snapshot kept so the last delete can be reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub operation: UndoOperation,
    pub pods: Vec<Pod>,
    pub tasks: Vec<Task>,
}

/// Result of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatched {
    /// A local mutation happened: the vault is now dirty
    pub mutated: bool,
    /// Persisted fields changed and should be written to the local store
    pub persist: bool,
    /// Ids of tasks advanced by a claim
    pub claimed: Vec<String>,
    /// An `ApplyServer` was dropped because the vault moved on since
    pub stale: bool,
    /// Controller revision after this dispatch
    pub revision: u64,
}

impl Dispatched {
    pub(crate) fn mutation() -> Self {
        Self {
            mutated: true,
            persist: true,
            ..Default::default()
        }
    }

    pub(crate) fn persisted() -> Self {
        Self {
            persist: true,
            ..Default::default()
        }
    }

    pub(crate) fn none() -> Self {
        Self::default()
    }
}
