//! Core domain types for podclock
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Pod** | An external app or service whose rewards are claimed periodically |
//! | **Task** | One recurring claim schedule under a Pod |
//! | **Claim** | Advancing every ready Task of a Pod and recording the reward |
//! | **Vault** | The full persisted user state |
//! | **Dirty** | The Vault holds local mutations the remote has not confirmed |
//!
//! All timestamps are epoch milliseconds (`i64`), matching the remote wire
//! format. `next_due_at` is the single source of truth for readiness.

use serde::{Deserialize, Serialize};

/// Maximum number of history entries kept in the vault.
pub const HISTORY_LIMIT: usize = 200;

/// Upper bound of [`Task::efficiency`].
pub const MAX_EFFICIENCY: u8 = 100;

/// Clamp a remote score into `0..=MAX_EFFICIENCY`, rounding fractions.
pub fn clamp_efficiency(score: f64) -> u8 {
    if score.is_nan() {
        return 0;
    }
    score.round().clamp(0.0, f64::from(MAX_EFFICIENCY)) as u8
}

/// The remote may send efficiency as any JSON number, or null.
fn deserialize_efficiency<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let score = Option::<f64>::deserialize(deserializer)?;
    Ok(score.map(clamp_efficiency).unwrap_or(0))
}

// ============================================
// Pods
// ============================================

/// An external app being monitored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Icon reference (emoji, URL or asset key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Fallback URL used to launch the external app
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_url: Option<String>,
    /// When the pod was created
    #[serde(default)]
    pub created_at: i64,
}

// ============================================
// Tasks
// ============================================

/// How a task's next due time is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrencePolicy {
    /// Fixed duration counted from the claim
    #[default]
    Sliding,
    /// Resets at local midnight regardless of claim time
    FixedDaily,
    /// Day split into fixed-size blocks anchored at local midnight
    Window,
}

impl RecurrencePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrencePolicy::Sliding => "SLIDING",
            RecurrencePolicy::FixedDaily => "FIXED_DAILY",
            RecurrencePolicy::Window => "WINDOW",
        }
    }
}

impl std::fmt::Display for RecurrencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecurrencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "SLIDING" => Ok(RecurrencePolicy::Sliding),
            "FIXED_DAILY" | "DAILY" => Ok(RecurrencePolicy::FixedDaily),
            "WINDOW" => Ok(RecurrencePolicy::Window),
            _ => Err(format!("unknown recurrence policy: {}", s)),
        }
    }
}

/// One recurring claim schedule under a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Owning pod
    pub pod_id: String,
    /// Display name
    pub name: String,
    /// Recurrence policy
    #[serde(default)]
    pub policy: RecurrencePolicy,
    /// Duration hours (ignored for FIXED_DAILY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_hours: Option<u32>,
    /// Duration minutes (ignored for FIXED_DAILY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_minutes: Option<u32>,
    /// When the task next becomes claimable
    pub next_due_at: i64,
    /// Consecutive successful claims
    #[serde(default)]
    pub streak: u32,
    /// 0-100 score maintained by the remote
    #[serde(default, deserialize_with = "deserialize_efficiency")]
    pub efficiency: u8,
    /// When the task was last claimed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_at: Option<i64>,
    /// Consumed by the external notification collaborator
    #[serde(default)]
    pub notification_enabled: bool,
}

impl Task {
    pub fn is_ready(&self, now: i64) -> bool {
        self.next_due_at <= now
    }
}

/// Explicit partial update for a task.
///
/// Schedule fields (`next_due_at`, `streak`, `last_completed_at`) are not
/// patchable; they move only through claims and reset/align actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub policy: Option<RecurrencePolicy>,
    pub custom_hours: Option<u32>,
    pub custom_minutes: Option<u32>,
    pub efficiency: Option<u8>,
    pub notification_enabled: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    /// Apply present fields to `task`. Returns true if the duration or
    /// policy changed, which means the schedule should be realigned.
    pub fn apply(self, task: &mut Task) -> bool {
        let mut schedule_changed = false;
        if let Some(name) = self.name {
            task.name = name;
        }
        if let Some(policy) = self.policy {
            schedule_changed |= task.policy != policy;
            task.policy = policy;
        }
        if let Some(hours) = self.custom_hours {
            schedule_changed |= task.custom_hours != Some(hours);
            task.custom_hours = Some(hours);
        }
        if let Some(minutes) = self.custom_minutes {
            schedule_changed |= task.custom_minutes != Some(minutes);
            task.custom_minutes = Some(minutes);
        }
        if let Some(efficiency) = self.efficiency {
            task.efficiency = efficiency.min(MAX_EFFICIENCY);
        }
        if let Some(enabled) = self.notification_enabled {
            task.notification_enabled = enabled;
        }
        schedule_changed
    }
}

/// Derived readiness of a task or pod.
///
/// Ordering is priority order: `Ready` sorts before `Urgent` before `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Due now
    Ready,
    /// Due within the urgent window
    Urgent,
    /// Still growing
    Active,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "READY",
            TaskStatus::Urgent => "URGENT",
            TaskStatus::Active => "ACTIVE",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// History & Preferences
// ============================================

/// One claim recorded in the vault history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub pod_id: String,
    pub pod_name: String,
    pub task_ids: Vec<String>,
    pub claimed_at: i64,
}

/// UI preference flags carried with the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub haptics_enabled: bool,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default)]
    pub compact_layout: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            haptics_enabled: true,
            sound_enabled: true,
            compact_layout: false,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================
// Vault
// ============================================

/// The full user state aggregate.
///
/// Owned by [`crate::vault::VaultController`]; never mutated elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vault {
    pub account_id: Option<String>,
    pub nickname: Option<String>,
    /// SHA-256 of the PIN; also the request signing secret
    pub hashed_pin: Option<String>,
    pub points: i64,
    pub pods: Vec<Pod>,
    pub tasks: Vec<Task>,
    /// Newest first, at most [`HISTORY_LIMIT`] entries
    pub history: Vec<HistoryEntry>,
    pub preferences: Preferences,
    pub is_dirty: bool,
    pub last_synced_at: Option<i64>,

    // Transient session state, never persisted
    pub maintenance: bool,
    pub is_syncing: bool,
    pub editing_pod_id: Option<String>,
}

impl Vault {
    pub fn is_registered(&self) -> bool {
        self.account_id.is_some() && self.hashed_pin.is_some()
    }

    pub fn pod(&self, pod_id: &str) -> Option<&Pod> {
        self.pods.iter().find(|p| p.id == pod_id)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Tasks belonging to `pod_id`, in vault order.
    pub fn tasks_for<'a>(&'a self, pod_id: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks.iter().filter(move |t| t.pod_id == pod_id)
    }

    /// Find a pod by id, falling back to a case-insensitive name match.
    pub fn find_pod(&self, key: &str) -> Option<&Pod> {
        self.pod(key).or_else(|| {
            self.pods
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(key))
        })
    }

    /// Find a task by id, falling back to a case-insensitive name match
    /// within `pod_id` when given.
    pub fn find_task(&self, key: &str, pod_id: Option<&str>) -> Option<&Task> {
        self.task(key).or_else(|| {
            self.tasks.iter().find(|t| {
                t.name.eq_ignore_ascii_case(key) && pod_id.map_or(true, |p| t.pod_id == p)
            })
        })
    }

    /// Replace every field present in `patch`.
    pub fn apply_patch(&mut self, patch: VaultPatch) {
        if let Some(account_id) = patch.account_id {
            self.account_id = Some(account_id);
        }
        if let Some(nickname) = patch.nickname {
            self.nickname = Some(nickname);
        }
        if let Some(points) = patch.points {
            self.points = points;
        }
        if let Some(pods) = patch.pods {
            self.pods = pods;
        }
        if let Some(mut tasks) = patch.tasks {
            for task in &mut tasks {
                task.efficiency = task.efficiency.min(MAX_EFFICIENCY);
            }
            self.tasks = tasks;
        }
        if let Some(mut history) = patch.history {
            history.truncate(HISTORY_LIMIT);
            self.history = history;
        }
        if let Some(preferences) = patch.preferences {
            self.preferences = preferences;
        }
    }

    /// The persisted allow-list view of this vault.
    pub fn to_persisted(&self) -> PersistedVault {
        PersistedVault {
            account_id: self.account_id.clone(),
            nickname: self.nickname.clone(),
            hashed_pin: self.hashed_pin.clone(),
            points: self.points,
            pods: self.pods.clone(),
            tasks: self.tasks.clone(),
            history: self.history.clone(),
            preferences: self.preferences.clone(),
            is_dirty: self.is_dirty,
            last_synced_at: self.last_synced_at,
        }
    }

    /// Rebuild a vault from its persisted form. Transient fields reset.
    pub fn from_persisted(persisted: PersistedVault) -> Self {
        Vault {
            account_id: persisted.account_id,
            nickname: persisted.nickname,
            hashed_pin: persisted.hashed_pin,
            points: persisted.points,
            pods: persisted.pods,
            tasks: persisted.tasks,
            history: persisted.history,
            preferences: persisted.preferences,
            is_dirty: persisted.is_dirty,
            last_synced_at: persisted.last_synced_at,
            ..Vault::default()
        }
    }
}

/// Partial vault update with explicit optional fields.
///
/// This is also the shape of the `vault` object in remote responses; fields
/// the remote does not send are left untouched locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<Vec<Pod>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Task>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Preferences>,
}

impl VaultPatch {
    pub fn is_empty(&self) -> bool {
        *self == VaultPatch::default()
    }
}

/// The allow-listed subset of [`Vault`] written to the local store and
/// pushed to the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedVault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_pin: Option<String>,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub is_dirty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, pod_id: &str, next_due_at: i64) -> Task {
        Task {
            id: id.to_string(),
            pod_id: pod_id.to_string(),
            name: id.to_string(),
            policy: RecurrencePolicy::Sliding,
            custom_hours: Some(4),
            custom_minutes: None,
            next_due_at,
            streak: 0,
            efficiency: 0,
            last_completed_at: None,
            notification_enabled: true,
        }
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "sliding".parse::<RecurrencePolicy>().unwrap(),
            RecurrencePolicy::Sliding
        );
        assert_eq!(
            "fixed-daily".parse::<RecurrencePolicy>().unwrap(),
            RecurrencePolicy::FixedDaily
        );
        assert_eq!(
            "WINDOW".parse::<RecurrencePolicy>().unwrap(),
            RecurrencePolicy::Window
        );
        assert!("hourly".parse::<RecurrencePolicy>().is_err());
    }

    #[test]
    fn test_task_wire_format() {
        let json = serde_json::to_value(task("t1", "p1", 42)).unwrap();
        assert_eq!(json["podId"], "p1");
        assert_eq!(json["nextDueAt"], 42);
        assert_eq!(json["policy"], "SLIDING");
        assert!(json.get("customMinutes").is_none());
    }

    #[test]
    fn test_apply_patch_replaces_present_fields_only() {
        let mut vault = Vault {
            nickname: Some("neo".to_string()),
            points: 10,
            tasks: vec![task("t1", "p1", 1)],
            ..Default::default()
        };

        vault.apply_patch(VaultPatch {
            points: Some(25),
            tasks: Some(vec![]),
            ..Default::default()
        });

        assert_eq!(vault.points, 25);
        assert!(vault.tasks.is_empty());
        assert_eq!(vault.nickname.as_deref(), Some("neo"));
    }

    #[test]
    fn test_patch_ignores_unknown_remote_fields() {
        let patch: VaultPatch = serde_json::from_str(
            r#"{"points": 7, "isSyncing": true, "editingAppId": "x"}"#,
        )
        .unwrap();
        assert_eq!(patch.points, Some(7));
        assert!(patch.pods.is_none());
    }

    #[test]
    fn test_remote_efficiency_is_clamped() {
        let patch: VaultPatch = serde_json::from_str(
            r#"{"tasks": [
                {"id": "t1", "podId": "p1", "name": "Spin", "nextDueAt": 1, "efficiency": 87.5},
                {"id": "t2", "podId": "p1", "name": "Chest", "nextDueAt": 1, "efficiency": 250},
                {"id": "t3", "podId": "p1", "name": "Daily", "nextDueAt": 1, "efficiency": -4},
                {"id": "t4", "podId": "p1", "name": "Bonus", "nextDueAt": 1, "efficiency": null}
            ]}"#,
        )
        .unwrap();

        let mut vault = Vault::default();
        vault.apply_patch(patch);
        let scores: Vec<u8> = vault.tasks.iter().map(|t| t.efficiency).collect();
        assert_eq!(scores, vec![88, 100, 0, 0]);
    }

    #[test]
    fn test_apply_patch_clamps_built_tasks() {
        let mut over = task("t1", "p1", 1);
        over.efficiency = 180;
        let mut vault = Vault::default();
        vault.apply_patch(VaultPatch {
            tasks: Some(vec![over]),
            ..Default::default()
        });
        assert_eq!(vault.tasks[0].efficiency, MAX_EFFICIENCY);
        assert_eq!(clamp_efficiency(f64::NAN), 0);
    }

    #[test]
    fn test_persisted_view_excludes_transient_fields() {
        let vault = Vault {
            points: 3,
            is_dirty: true,
            maintenance: true,
            is_syncing: true,
            editing_pod_id: Some("p1".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_value(vault.to_persisted()).unwrap();
        assert!(json.get("maintenance").is_none());
        assert!(json.get("isSyncing").is_none());
        assert!(json.get("editingPodId").is_none());
        assert_eq!(json["isDirty"], true);

        let restored = Vault::from_persisted(vault.to_persisted());
        assert!(!restored.maintenance);
        assert!(!restored.is_syncing);
        assert!(restored.editing_pod_id.is_none());
        assert_eq!(restored.points, 3);
    }

    #[test]
    fn test_task_patch_reports_schedule_changes() {
        let mut t = task("t1", "p1", 0);
        let changed = TaskPatch {
            name: Some("Daily spin".to_string()),
            ..Default::default()
        }
        .apply(&mut t);
        assert!(!changed);
        assert_eq!(t.name, "Daily spin");

        let changed = TaskPatch {
            custom_hours: Some(8),
            efficiency: Some(250),
            ..Default::default()
        }
        .apply(&mut t);
        assert!(changed);
        assert_eq!(t.efficiency, 100);
    }

    #[test]
    fn test_status_priority_order() {
        let mut statuses = vec![TaskStatus::Active, TaskStatus::Ready, TaskStatus::Urgent];
        statuses.sort();
        assert_eq!(
            statuses,
            vec![TaskStatus::Ready, TaskStatus::Urgent, TaskStatus::Active]
        );
    }
}
