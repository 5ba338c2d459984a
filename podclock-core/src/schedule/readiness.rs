//! Readiness classification
//!
//! A read-only projection of the vault, recomputed on every display tick.

use serde::Serialize;

use crate::types::{Pod, Task, TaskStatus};

/// Default pre-due window flagged as urgent (5 minutes).
pub const URGENT_WINDOW_MS: i64 = 300_000;

/// Classify a task with the default urgent window.
pub fn classify_task(task: &Task, now: i64) -> TaskStatus {
    classify_task_with(task, now, URGENT_WINDOW_MS)
}

/// Classify a task against an explicit urgent window.
pub fn classify_task_with(task: &Task, now: i64, urgent_window_ms: i64) -> TaskStatus {
    let remaining = task.next_due_at - now;
    if remaining <= 0 {
        TaskStatus::Ready
    } else if remaining < urgent_window_ms {
        TaskStatus::Urgent
    } else {
        TaskStatus::Active
    }
}

/// Aggregate status of every task owned by `pod_id`.
///
/// A pod without tasks is `Active`: never ready, never urgent.
pub fn classify_pod(pod_id: &str, tasks: &[Task], now: i64) -> TaskStatus {
    classify_pod_with(pod_id, tasks, now, URGENT_WINDOW_MS)
}

pub fn classify_pod_with(
    pod_id: &str,
    tasks: &[Task],
    now: i64,
    urgent_window_ms: i64,
) -> TaskStatus {
    tasks
        .iter()
        .filter(|t| t.pod_id == pod_id)
        .map(|t| classify_task_with(t, now, urgent_window_ms))
        .min()
        .unwrap_or(TaskStatus::Active)
}

/// True if any task with notifications enabled is due.
pub fn any_notifiable_ready(tasks: &[Task], now: i64) -> bool {
    tasks
        .iter()
        .any(|t| t.notification_enabled && t.is_ready(now))
}

/// One row of the ready queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodReadiness {
    pub pod_id: String,
    pub pod_name: String,
    pub status: TaskStatus,
    /// Earliest `next_due_at` among the pod's tasks
    pub next_due_at: Option<i64>,
    /// Tasks currently ready
    pub ready_tasks: usize,
    pub total_tasks: usize,
}

impl PodReadiness {
    /// Milliseconds until the pod's earliest task is due, zero once due.
    pub fn remaining_ms(&self, now: i64) -> Option<i64> {
        self.next_due_at.map(|due| (due - now).max(0))
    }
}

/// Every pod with its aggregate status, highest priority first.
///
/// Ordered by status (`Ready`, `Urgent`, `Active`), then earliest due time
/// (pods without tasks last), then name.
pub fn ready_queue(
    pods: &[Pod],
    tasks: &[Task],
    now: i64,
    urgent_window_ms: i64,
) -> Vec<PodReadiness> {
    let mut rows: Vec<PodReadiness> = pods
        .iter()
        .map(|pod| {
            let owned: Vec<&Task> = tasks.iter().filter(|t| t.pod_id == pod.id).collect();
            let status = owned
                .iter()
                .map(|t| classify_task_with(t, now, urgent_window_ms))
                .min()
                .unwrap_or(TaskStatus::Active);
            PodReadiness {
                pod_id: pod.id.clone(),
                pod_name: pod.name.clone(),
                status,
                next_due_at: owned.iter().map(|t| t.next_due_at).min(),
                ready_tasks: owned.iter().filter(|t| t.is_ready(now)).count(),
                total_tasks: owned.len(),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.status
            .cmp(&b.status)
            .then_with(|| {
                a.next_due_at
                    .unwrap_or(i64::MAX)
                    .cmp(&b.next_due_at.unwrap_or(i64::MAX))
            })
            .then_with(|| a.pod_name.cmp(&b.pod_name))
    });
    rows
}
