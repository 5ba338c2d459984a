//! Text and JSON rendering of the status board.

use chrono::{Local, TimeZone};
use podclock_core::schedule::readiness::classify_task_with;
use podclock_core::{ready_queue, PodReadiness, SyncStatus, TaskStatus, Vault};
use serde::Serialize;

/// Machine-readable status (`status --json`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub now: i64,
    pub nickname: Option<String>,
    pub registered: bool,
    pub points: i64,
    pub dirty: bool,
    pub maintenance: bool,
    pub last_synced_at: Option<i64>,
    pub undo_available: bool,
    pub pods: Vec<PodReadiness>,
    pub tasks: Vec<TaskLine>,
    pub sync: SyncStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLine {
    pub id: String,
    pub pod_id: String,
    pub name: String,
    pub policy: String,
    pub status: TaskStatus,
    pub next_due_at: i64,
    pub streak: u32,
    pub notification_enabled: bool,
}

impl StatusReport {
    pub fn build(
        vault: &Vault,
        now: i64,
        urgent_window_ms: i64,
        undo_available: bool,
        sync: SyncStatus,
    ) -> Self {
        let tasks = vault
            .tasks
            .iter()
            .map(|t| TaskLine {
                id: t.id.clone(),
                pod_id: t.pod_id.clone(),
                name: t.name.clone(),
                policy: t.policy.to_string(),
                status: classify_task_with(t, now, urgent_window_ms),
                next_due_at: t.next_due_at,
                streak: t.streak,
                notification_enabled: t.notification_enabled,
            })
            .collect();

        Self {
            now,
            nickname: vault.nickname.clone(),
            registered: vault.is_registered(),
            points: vault.points,
            dirty: vault.is_dirty,
            maintenance: vault.maintenance,
            last_synced_at: vault.last_synced_at,
            undo_available,
            pods: ready_queue(&vault.pods, &vault.tasks, now, urgent_window_ms),
            tasks,
            sync,
        }
    }
}

/// Human-readable board, one line per pod with its tasks underneath.
pub fn board(report: &StatusReport) -> String {
    let mut out = String::new();
    out.push_str(&header(report));
    out.push('\n');

    if report.pods.is_empty() {
        out.push_str("\nNo pods yet. Add one with `podclock add-pod <name>`.\n");
        return out;
    }

    for pod in &report.pods {
        out.push('\n');
        out.push_str(&format!(
            "{:<8} {:<24} {}\n",
            pod.status.as_str(),
            pod.pod_name,
            pod_summary(pod, report.now)
        ));
        for task in report.tasks.iter().filter(|t| t.pod_id == pod.pod_id) {
            out.push_str(&format!(
                "         - {:<22} {:<8} {:<12} streak {}\n",
                task.name,
                task.status.as_str(),
                countdown(task.next_due_at, report.now),
                task.streak
            ));
        }
    }
    out
}

fn header(report: &StatusReport) -> String {
    let who = match (&report.nickname, report.registered) {
        (Some(nickname), true) => nickname.clone(),
        _ => "local vault".to_string(),
    };
    let mut parts = vec![who, format!("{} pts", report.points)];
    if report.maintenance {
        parts.push("remote in maintenance".to_string());
    }
    if report.dirty {
        parts.push("unsynced changes".to_string());
    } else if let Some(at) = report.last_synced_at {
        parts.push(format!("synced {}", ago(at, report.now)));
    }
    if report.sync.consecutive_failures > 0 {
        parts.push(format!("{} failed syncs", report.sync.consecutive_failures));
    }
    parts.join(" | ")
}

fn pod_summary(pod: &PodReadiness, now: i64) -> String {
    match (pod.status, pod.next_due_at) {
        (_, None) => "no tasks".to_string(),
        (TaskStatus::Ready, _) => format!("{}/{} ready", pod.ready_tasks, pod.total_tasks),
        (_, Some(due)) => format!("{} ({})", countdown(due, now), clock_time(due)),
    }
}

/// "ready" once due, otherwise the remaining time.
pub fn countdown(due: i64, now: i64) -> String {
    if due <= now {
        return "ready".to_string();
    }
    format!("in {}", duration(due - now))
}

fn ago(at: i64, now: i64) -> String {
    let elapsed = (now - at).max(0);
    if elapsed < 60_000 {
        "just now".to_string()
    } else {
        format!("{} ago", duration(elapsed))
    }
}

/// Compact duration: `3h 12m`, `4m 10s`, `9s`.
pub fn duration(ms: i64) -> String {
    let secs = ms / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {}m", h, m)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Local wall-clock time of an epoch-ms instant.
pub fn clock_time(at: i64) -> String {
    match Local.timestamp_millis_opt(at).single() {
        Some(dt) => dt.format("%a %H:%M").to_string(),
        None => "?".to_string(),
    }
}
