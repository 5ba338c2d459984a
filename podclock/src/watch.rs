//! Watch mode: live board plus heartbeat syncs until Ctrl-C.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use podclock_core::schedule::readiness::any_notifiable_ready;
use podclock_core::{SyncOutcome, SyncTrigger, TaskStatus};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::render::{self, StatusReport};
use crate::App;

pub async fn run(engine: &Arc<App>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })
    .context("failed to set Ctrl-C handler")?;

    println!("Watching vault (Ctrl-C to stop)");
    tracing::info!("Watch mode started");

    match engine.sync(SyncTrigger::Foreground).await {
        outcome @ SyncOutcome::Failed(_) => eprintln!("Sync {}", outcome),
        outcome => tracing::debug!(outcome = %outcome, "Startup sync"),
    }

    tokio::join!(
        engine.run_heartbeat(stopped(shutdown_rx.clone())),
        board_loop(engine, shutdown_rx),
    );

    tracing::info!("Watch mode stopped");
    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Redraw whenever the board's shape changes and announce pods that just
/// turned ready.
async fn board_loop(engine: &App, shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(engine.timing().tick());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let stop = stopped(shutdown);
    tokio::pin!(stop);

    let mut last_signature = None;
    let mut ready: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = interval.tick() => {}
        }

        let now = engine.now_ms();
        let vault = engine.snapshot();
        let report = StatusReport::build(
            &vault,
            now,
            engine.timing().urgent_window_ms,
            engine.vault().undo_entry().is_some(),
            engine.sync_status(),
        );

        let now_ready: HashSet<String> = report
            .pods
            .iter()
            .filter(|p| p.status == TaskStatus::Ready)
            .map(|p| p.pod_id.clone())
            .collect();
        for pod in report.pods.iter().filter(|p| !ready.contains(&p.pod_id)) {
            if !now_ready.contains(&pod.pod_id) {
                continue;
            }
            let tasks: Vec<_> = vault.tasks_for(&pod.pod_id).cloned().collect();
            if any_notifiable_ready(&tasks, now) {
                println!("** {} is ready to claim", pod.pod_name);
                tracing::info!(pod_id = %pod.pod_id, "Pod ready");
            }
        }
        ready = now_ready;

        let signature = signature(&report);
        if last_signature.as_ref() != Some(&signature) {
            println!("\n[{}]", render::clock_time(now));
            print!("{}", render::board(&report));
            last_signature = Some(signature);
        }
    }
}

/// Everything on the board except the ticking countdowns.
fn signature(report: &StatusReport) -> String {
    let mut parts = vec![format!(
        "{}:{}:{}:{:?}:{}",
        report.points,
        report.dirty,
        report.maintenance,
        report.last_synced_at,
        report.sync.consecutive_failures
    )];
    for pod in &report.pods {
        parts.push(format!(
            "{}={}/{}/{}",
            pod.pod_id,
            pod.status.as_str(),
            pod.ready_tasks,
            pod.total_tasks
        ));
    }
    for task in &report.tasks {
        parts.push(format!("{}={}/{}", task.id, task.status.as_str(), task.next_due_at));
    }
    parts.join(";")
}
