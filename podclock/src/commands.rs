//! Command handlers.
//!
//! Every handler mutates through the engine and returns; persistence and the
//! follow-up sync happen in [`run`] once the handler is done.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use podclock_core::vault::{NewPod, NewTask};
use podclock_core::{
    Action, RecurrencePolicy, SkipReason, SyncOutcome, SyncTrigger, Task, TaskPatch,
};

use crate::render::{self, StatusReport};
use crate::{watch, App, Command};

/// Run one command against the engine.
pub async fn run(engine: &Arc<App>, command: Command) -> Result<()> {
    let mutates = !matches!(
        command,
        Command::Status { .. }
            | Command::Register { .. }
            | Command::Login { .. }
            | Command::Logout
            | Command::Sync
            | Command::Watch
    );
    if mutates && engine.vault().read(|v| v.maintenance) {
        bail!("remote is in maintenance mode, edits are paused until `podclock sync` succeeds");
    }

    match command {
        Command::Status { json } => status(engine, json)?,
        Command::AddPod { name, icon, url } => add_pod(engine, name, icon, url)?,
        Command::EditPod {
            pod,
            name,
            icon,
            url,
        } => edit_pod(engine, &pod, name, icon, url)?,
        Command::RemovePod { pod } => remove_pod(engine, &pod)?,
        Command::AddTask {
            pod,
            name,
            policy,
            hours,
            minutes,
            no_notify,
        } => add_task(engine, &pod, name, &policy, hours, minutes, !no_notify)?,
        Command::EditTask {
            task,
            pod,
            name,
            policy,
            hours,
            minutes,
            notify,
        } => {
            let policy = policy.as_deref().map(parse_policy).transpose()?;
            let patch = TaskPatch {
                name,
                policy,
                custom_hours: hours,
                custom_minutes: minutes,
                efficiency: None,
                notification_enabled: notify,
            };
            edit_task(engine, &task, pod.as_deref(), patch)?
        }
        Command::RemoveTask { task, pod } => remove_task(engine, &task, pod.as_deref())?,
        Command::ResetTask { task, pod } => {
            let task = resolve_task(engine, &task, pod.as_deref())?;
            engine.dispatch(Action::ResetTask {
                task_id: task.id.clone(),
                now: engine.now_ms(),
            })?;
            println!("{} is ready now", task.name);
        }
        Command::AlignTask { task, pod } => {
            let task = resolve_task(engine, &task, pod.as_deref())?;
            engine.dispatch(Action::AlignTask {
                task_id: task.id.clone(),
                now: engine.now_ms(),
            })?;
            let due = engine.vault().read(|v| v.task(&task.id).map(|t| t.next_due_at));
            if let Some(due) = due {
                println!("{} next due {}", task.name, render::clock_time(due));
            }
        }
        Command::Undo => {
            engine.dispatch(Action::Undo)?;
            println!("Restored last removal");
        }
        Command::Claim { pod, offset_ms } => claim(engine, &pod, offset_ms).await?,
        Command::Prefs {
            haptics,
            sound,
            compact,
        } => {
            let mut preferences = engine.vault().read(|v| v.preferences.clone());
            if let Some(v) = haptics {
                preferences.haptics_enabled = v;
            }
            if let Some(v) = sound {
                preferences.sound_enabled = v;
            }
            if let Some(v) = compact {
                preferences.compact_layout = v;
            }
            engine.dispatch(Action::SetPreferences(preferences.clone()))?;
            println!(
                "haptics={} sound={} compact={}",
                preferences.haptics_enabled, preferences.sound_enabled, preferences.compact_layout
            );
        }
        Command::Register { nickname, pin } => {
            engine
                .register(&nickname, &pin)
                .await
                .context("registration failed")?;
            println!("Registered as {}", nickname.trim());
        }
        Command::Login { nickname, pin } => {
            engine.login(&nickname, &pin).await.context("login failed")?;
            let (pods, tasks) = engine.vault().read(|v| (v.pods.len(), v.tasks.len()));
            println!("Logged in as {} ({} pods, {} tasks)", nickname.trim(), pods, tasks);
        }
        Command::Logout => {
            engine.logout().context("logout failed")?;
            println!("Logged out, local vault cleared");
        }
        Command::Sync => {
            let outcome = engine.sync(SyncTrigger::Manual).await;
            report_sync(&outcome);
            if let SyncOutcome::Failed(error) = outcome {
                bail!("sync failed: {}", error);
            }
        }
        Command::Watch => watch::run(engine).await?,
    }

    if mutates {
        sync_after_edit(engine).await;
    }
    Ok(())
}

fn status(engine: &App, json: bool) -> Result<()> {
    let report = StatusReport::build(
        &engine.snapshot(),
        engine.now_ms(),
        engine.timing().urgent_window_ms,
        engine.vault().undo_entry().is_some(),
        engine.sync_status(),
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render::board(&report));
    }
    Ok(())
}

fn add_pod(engine: &Arc<App>, name: String, icon: Option<String>, url: Option<String>) -> Result<()> {
    let pod = NewPod {
        icon,
        launch_url: url,
        ..NewPod::named(name)
    };
    let id = pod.id.clone();
    engine.dispatch(Action::AddPod {
        pod,
        now: engine.now_ms(),
    })?;
    println!("Added pod {}", id);
    Ok(())
}

fn edit_pod(
    engine: &Arc<App>,
    key: &str,
    name: Option<String>,
    icon: Option<String>,
    url: Option<String>,
) -> Result<()> {
    if name.is_none() && icon.is_none() && url.is_none() {
        bail!("nothing to change, pass --name, --icon or --url");
    }
    let pod_id = resolve_pod(engine, key)?;
    engine.dispatch(Action::UpdatePod {
        pod_id,
        name,
        icon,
        launch_url: url,
    })?;
    println!("Updated pod {}", key);
    Ok(())
}

fn remove_pod(engine: &Arc<App>, key: &str) -> Result<()> {
    let pod_id = resolve_pod(engine, key)?;
    engine.dispatch(Action::DeletePod { pod_id })?;
    let removed = engine
        .vault()
        .undo_entry()
        .map(|entry| entry.tasks.len())
        .unwrap_or(0);
    println!("Removed pod {} and {} tasks (undo with `podclock undo`)", key, removed);
    Ok(())
}

fn add_task(
    engine: &Arc<App>,
    pod: &str,
    name: String,
    policy: &str,
    hours: Option<u32>,
    minutes: Option<u32>,
    notify: bool,
) -> Result<()> {
    let pod_id = resolve_pod(engine, pod)?;
    let policy = parse_policy(policy)?;
    let task = NewTask {
        notification_enabled: notify,
        ..NewTask::new(pod_id, name, policy, hours, minutes)
    };
    let id = task.id.clone();
    engine.dispatch(Action::AddTask {
        task,
        now: engine.now_ms(),
    })?;
    if let Some(due) = engine.vault().read(|v| v.task(&id).map(|t| t.next_due_at)) {
        println!("Added task {} (due {})", id, render::clock_time(due));
    }
    Ok(())
}

fn edit_task(engine: &Arc<App>, key: &str, pod: Option<&str>, patch: TaskPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("nothing to change");
    }
    let task = resolve_task(engine, key, pod)?;
    engine.dispatch(Action::UpdateTask {
        task_id: task.id,
        patch,
        now: engine.now_ms(),
    })?;
    println!("Updated task {}", key);
    Ok(())
}

fn remove_task(engine: &Arc<App>, key: &str, pod: Option<&str>) -> Result<()> {
    let task = resolve_task(engine, key, pod)?;
    engine.dispatch(Action::DeleteTask {
        task_id: task.id,
    })?;
    println!("Removed task {} (undo with `podclock undo`)", task.name);
    Ok(())
}

async fn claim(engine: &Arc<App>, key: &str, offset_ms: Option<i64>) -> Result<()> {
    let pod_id = resolve_pod(engine, key)?;
    let offset_ms = offset_ms.unwrap_or(engine.timing().claim_offset_ms);

    let Some(flight) = engine.begin_claim(&pod_id, offset_ms) else {
        println!("Nothing due in {}", key);
        return Ok(());
    };
    let claimed = flight.claimed().len();
    engine.finish_claim(flight).await;

    let points = engine.vault().read(|v| v.points);
    println!("Claimed {} task(s) in {} ({} pts)", claimed, key, points);
    Ok(())
}

/// Push local edits right away instead of waiting for the debounce.
async fn sync_after_edit(engine: &App) {
    if engine.remote().is_none() || !engine.vault().read(|v| v.is_dirty) {
        return;
    }
    let outcome = engine.sync(SyncTrigger::Dirty).await;
    match outcome {
        SyncOutcome::Pushed | SyncOutcome::Fetched => {}
        SyncOutcome::Skipped(SkipReason::NotRegistered) => {}
        other => report_sync(&other),
    }
}

fn report_sync(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Skipped(SkipReason::Offline) => {
            println!("Sync skipped: remote.endpoint is not configured")
        }
        SyncOutcome::Skipped(SkipReason::NotRegistered) => {
            println!("Sync skipped: register or log in first")
        }
        SyncOutcome::Failed(_) => eprintln!("Sync {}", outcome),
        other => println!("Sync {}", other),
    }
}

fn resolve_pod(engine: &App, key: &str) -> Result<String> {
    engine
        .vault()
        .read(|v| v.find_pod(key).map(|p| p.id.clone()))
        .with_context(|| format!("no pod named {}", key))
}

fn resolve_task(engine: &App, key: &str, pod: Option<&str>) -> Result<Task> {
    let pod_id = pod.map(|p| resolve_pod(engine, p)).transpose()?;
    engine
        .vault()
        .read(|v| v.find_task(key, pod_id.as_deref()).cloned())
        .with_context(|| format!("no task named {}", key))
}

fn parse_policy(value: &str) -> Result<RecurrencePolicy> {
    value.parse::<RecurrencePolicy>().map_err(anyhow::Error::msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_parse_from_flags() {
        assert_eq!(parse_policy("fixed-daily").unwrap(), RecurrencePolicy::FixedDaily);
        assert!(parse_policy("weekly").is_err());
    }
}
