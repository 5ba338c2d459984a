//! Engine scenarios against a scripted remote
//!
//! The transport records every signed body it receives and answers from a
//! queue, so claims and syncs can be driven end to end without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use podclock_core::clock::ManualClock;
use podclock_core::config::TimingConfig;
use podclock_core::engine::{SkipReason, SyncOutcome, SyncTrigger};
use podclock_core::remote::{
    RemoteClient, RemoteResponse, RemoteTransport, MAINTENANCE_ACTIVE, NICKNAME_TAKEN,
};
use podclock_core::signer::{hash_credential, sign, SignedRequest};
use podclock_core::types::{Pod, RecurrencePolicy, Task, Vault};
use podclock_core::vault::{Action, NewPod};
use podclock_core::{Engine, Error, Result, VaultStore};
use serde_json::{json, Value};
use tokio::sync::Notify;

const SALT: &str = "test-salt";
const T: i64 = 1_741_944_413_000;
const FOUR_HOURS: i64 = 14_400_000;

#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<RemoteResponse>>>,
    requests: Mutex<Vec<Value>>,
    /// Held by the first call until notified
    gate: Mutex<Option<Arc<Notify>>>,
    /// Runs on every call before it answers
    hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl ScriptedTransport {
    fn respond(&self, response: Result<RemoteResponse>) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    fn hold_first_call(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    fn on_call(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    fn clear_on_call(&self) {
        *self.hook.lock().unwrap() = None;
    }
}

impl RemoteTransport for ScriptedTransport {
    async fn call(&self, request: &SignedRequest) -> Result<RemoteResponse> {
        self.requests.lock().unwrap().push(request.clone().into_body());
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook();
        }
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(RemoteResponse::ok(Some(json!({})))))
    }
}

struct Harness {
    engine: Arc<Engine<Arc<ScriptedTransport>>>,
    transport: Arc<ScriptedTransport>,
    clock: Arc<ManualClock>,
    store: Arc<VaultStore>,
}

fn harness(vault: Vault) -> Harness {
    harness_with(vault, TimingConfig::default())
}

fn harness_with(vault: Vault, timing: TimingConfig) -> Harness {
    let transport = Arc::new(ScriptedTransport::default());
    let clock = Arc::new(ManualClock::new(T));
    let store = VaultStore::open_in_memory().unwrap();
    store.migrate().unwrap();
    let store = Arc::new(store);

    let engine = Engine::new(clock.clone(), timing)
        .with_remote(RemoteClient::new(Arc::clone(&transport), SALT))
        .with_store(Arc::clone(&store))
        .with_vault(vault);

    Harness {
        engine: Arc::new(engine),
        transport,
        clock,
        store,
    }
}

fn pod(id: &str) -> Pod {
    Pod {
        id: id.to_string(),
        name: format!("Pod {}", id),
        icon: None,
        launch_url: None,
        created_at: T - FOUR_HOURS,
    }
}

fn sliding_task(id: &str, pod_id: &str, next_due_at: i64) -> Task {
    Task {
        id: id.to_string(),
        pod_id: pod_id.to_string(),
        name: format!("Task {}", id),
        policy: RecurrencePolicy::Sliding,
        custom_hours: Some(4),
        custom_minutes: Some(0),
        next_due_at,
        streak: 0,
        efficiency: 0,
        last_completed_at: None,
        notification_enabled: true,
    }
}

/// A registered, clean vault with one ready task in pod `p1`.
fn registered_vault() -> Vault {
    Vault {
        account_id: Some("acc-1".to_string()),
        nickname: Some("neo".to_string()),
        hashed_pin: Some(hash_credential("1234")),
        pods: vec![pod("p1")],
        tasks: vec![sliding_task("t1", "p1", T - 1_000)],
        ..Vault::default()
    }
}

fn assert_signed(body: &Value, secret: &str) {
    let mut unsigned = body.as_object().unwrap().clone();
    let sig = unsigned.remove("_sig").unwrap();
    let ts = unsigned.remove("_ts").unwrap().as_i64().unwrap();
    assert_eq!(sig, json!(sign(&Value::Object(unsigned), secret, ts, SALT)));
}

// ============================================
// Claims
// ============================================

#[tokio::test]
async fn test_sliding_claim_commits_and_merges_response() {
    let h = harness(registered_vault());
    h.transport
        .respond(Ok(RemoteResponse::ok(Some(json!({"points": 5})))));

    assert!(h.engine.claim("p1", 10_000).await);

    let vault = h.engine.snapshot();
    let task = vault.task("t1").unwrap();
    assert_eq!(task.next_due_at, T + 10_000 + FOUR_HOURS);
    assert_eq!(task.streak, 1);
    assert_eq!(task.last_completed_at, Some(T + 10_000));
    assert_eq!(vault.points, 5);
    assert!(!vault.is_dirty);
    assert_eq!(vault.last_synced_at, Some(T));

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["action"], json!("CLAIM_POD"));
    assert_eq!(requests[0]["appId"], json!("p1"));
    assert_eq!(requests[0]["offsetMs"], json!(10_000));
    assert_eq!(requests[0]["accountId"], json!("acc-1"));
    assert_signed(&requests[0], &hash_credential("1234"));

    let stored = h.store.load().unwrap().unwrap();
    assert_eq!(stored.points, 5);
    assert!(!stored.is_dirty);
}

#[tokio::test]
async fn test_claim_persists_before_remote_answers() {
    let h = harness(registered_vault());
    let gate = h.transport.hold_first_call();

    let engine = Arc::clone(&h.engine);
    let claim = tokio::spawn(async move { engine.claim("p1", 0).await });
    while h.transport.requests().is_empty() {
        tokio::task::yield_now().await;
    }

    let stored = h.store.load().unwrap().unwrap();
    assert!(stored.is_dirty);
    assert_eq!(stored.tasks[0].streak, 1);

    gate.notify_one();
    assert!(claim.await.unwrap());
}

#[tokio::test]
async fn test_claim_failure_keeps_optimistic_state() {
    let h = harness(registered_vault());
    h.transport.respond(Err(Error::SyncTimeout));

    assert!(h.engine.claim("p1", 0).await);

    let vault = h.engine.snapshot();
    assert!(vault.is_dirty);
    assert_eq!(vault.task("t1").unwrap().streak, 1);
    assert_eq!(vault.task("t1").unwrap().next_due_at, T + FOUR_HOURS);
    assert_eq!(h.engine.sync_status().consecutive_failures, 1);
    assert!(h.store.load().unwrap().unwrap().is_dirty);
}

#[tokio::test]
async fn test_claim_maintenance_response_sets_flag() {
    let h = harness(registered_vault());
    h.transport
        .respond(Ok(RemoteResponse::failure(MAINTENANCE_ACTIVE, "upgrading")));

    assert!(h.engine.claim("p1", 0).await);

    let vault = h.engine.snapshot();
    assert!(vault.maintenance);
    assert!(vault.is_dirty);
    assert_eq!(vault.task("t1").unwrap().streak, 1);
}

#[tokio::test]
async fn test_claim_refused_during_maintenance() {
    let h = harness(registered_vault());
    h.engine.vault().dispatch(Action::SetMaintenance(true)).unwrap();

    assert!(!h.engine.claim("p1", 0).await);

    let vault = h.engine.snapshot();
    assert_eq!(vault.task("t1").unwrap().next_due_at, T - 1_000);
    assert!(!vault.is_dirty);
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn test_spawned_claim_commits_before_confirmation() {
    let h = harness(registered_vault());
    let gate = h.transport.hold_first_call();
    h.transport
        .respond(Ok(RemoteResponse::ok(Some(json!({"points": 11})))));

    assert!(h.engine.spawn_claim("p1", 0));

    let vault = h.engine.snapshot();
    assert_eq!(vault.task("t1").unwrap().streak, 1);
    assert_eq!(vault.task("t1").unwrap().next_due_at, T + FOUR_HOURS);
    assert!(vault.is_dirty);
    let stored = h.store.load().unwrap().unwrap();
    assert_eq!(stored.tasks[0].streak, 1);
    assert!(stored.is_dirty);

    while h.transport.requests().is_empty() {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.transport.requests()[0]["action"], json!("CLAIM_POD"));
    assert!(h.engine.snapshot().is_dirty);

    gate.notify_one();
    while h.engine.snapshot().is_dirty {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.engine.snapshot().points, 11);
    assert_eq!(h.engine.snapshot().task("t1").unwrap().streak, 1);
    assert!(!h.store.load().unwrap().unwrap().is_dirty);
}

#[tokio::test]
async fn test_spawned_claim_with_nothing_due() {
    let mut vault = registered_vault();
    vault.tasks[0].next_due_at = T + 60_000;
    let h = harness(vault);

    assert!(!h.engine.spawn_claim("p1", 0));
    tokio::task::yield_now().await;
    assert!(h.transport.requests().is_empty());
}

#[test]
fn test_spawned_claim_without_runtime_stays_local() {
    let h = harness(registered_vault());

    assert!(h.engine.spawn_claim("p1", 0));

    assert!(h.transport.requests().is_empty());
    assert!(h.engine.snapshot().is_dirty);
    assert_eq!(h.store.load().unwrap().unwrap().tasks[0].streak, 1);
}

#[tokio::test]
async fn test_claim_with_nothing_due_makes_no_call() {
    let mut vault = registered_vault();
    vault.tasks[0].next_due_at = T + 60_000;
    let h = harness(vault);

    assert!(!h.engine.claim("p1", 0).await);
    assert!(h.transport.requests().is_empty());
    assert!(!h.engine.snapshot().is_dirty);
}

#[tokio::test]
async fn test_unregistered_claim_stays_local() {
    let mut vault = registered_vault();
    vault.account_id = None;
    vault.hashed_pin = None;
    let h = harness(vault);

    assert!(h.engine.claim("p1", 0).await);
    assert!(h.transport.requests().is_empty());
    assert!(h.engine.snapshot().is_dirty);
}

#[tokio::test]
async fn test_claim_over_unsynced_edits_does_not_merge() {
    let mut vault = registered_vault();
    vault.is_dirty = true;
    vault.pods.push(pod("p2"));
    let h = harness(vault);
    h.transport
        .respond(Ok(RemoteResponse::ok(Some(json!({"pods": []})))));

    assert!(h.engine.claim("p1", 0).await);

    let vault = h.engine.snapshot();
    assert_eq!(vault.pods.len(), 2);
    assert!(vault.is_dirty);
}

// ============================================
// Sync
// ============================================

#[tokio::test]
async fn test_clean_vault_fetches_and_replaces() {
    let h = harness(registered_vault());
    h.transport.respond(Ok(RemoteResponse::ok(Some(json!({
        "points": 40,
        "pods": [{"id": "remote", "name": "Remote", "createdAt": 1}],
        "tasks": []
    })))));

    assert_eq!(h.engine.sync(SyncTrigger::Manual).await, SyncOutcome::Fetched);

    let vault = h.engine.snapshot();
    assert_eq!(vault.points, 40);
    assert_eq!(vault.pods.len(), 1);
    assert_eq!(vault.pods[0].id, "remote");
    assert!(vault.tasks.is_empty());

    let requests = h.transport.requests();
    assert_eq!(requests[0]["action"], json!("FETCH"));
    assert_eq!(requests[0]["nickname"], json!("neo"));
    assert!(requests[0].get("vault").is_none());
}

#[tokio::test]
async fn test_dirty_vault_pushes_snapshot() {
    let mut vault = registered_vault();
    vault.is_dirty = true;
    let h = harness(vault);

    assert_eq!(h.engine.sync(SyncTrigger::Dirty).await, SyncOutcome::Pushed);

    let requests = h.transport.requests();
    assert_eq!(requests[0]["action"], json!("PUSH"));
    assert_eq!(requests[0]["vault"]["tasks"][0]["id"], json!("t1"));
    assert!(requests[0]["vault"].get("maintenance").is_none());
    assert_signed(&requests[0], &hash_credential("1234"));

    let vault = h.engine.snapshot();
    assert!(!vault.is_dirty);
    assert_eq!(vault.last_synced_at, Some(T));
    assert!(!vault.is_syncing);
}

#[tokio::test]
async fn test_heartbeat_suppressed_after_recent_sync() {
    let h = harness(registered_vault());
    assert!(h.engine.sync(SyncTrigger::Manual).await.is_success());

    h.clock.advance(10_000);
    assert_eq!(
        h.engine.sync(SyncTrigger::Heartbeat).await,
        SyncOutcome::Skipped(SkipReason::RecentlySynced)
    );
    assert!(h.engine.sync(SyncTrigger::Manual).await.is_success());

    h.clock.advance(61_000);
    assert!(h.engine.sync(SyncTrigger::Heartbeat).await.is_success());
    assert_eq!(h.transport.requests().len(), 3);
}

#[tokio::test]
async fn test_dirty_vault_heartbeat_not_suppressed() {
    let h = harness(registered_vault());
    assert!(h.engine.sync(SyncTrigger::Manual).await.is_success());

    h.engine
        .vault()
        .dispatch(Action::AddPod {
            pod: NewPod::named("Game"),
            now: T,
        })
        .unwrap();
    h.clock.advance(1_000);
    assert_eq!(h.engine.sync(SyncTrigger::Heartbeat).await, SyncOutcome::Pushed);
}

#[tokio::test]
async fn test_failure_opens_backoff_window() {
    let mut vault = registered_vault();
    vault.is_dirty = true;
    let h = harness(vault);
    h.transport
        .respond(Err(Error::Remote("connection reset".to_string())));

    assert!(matches!(
        h.engine.sync(SyncTrigger::Dirty).await,
        SyncOutcome::Failed(_)
    ));
    assert!(h.engine.snapshot().is_dirty);
    assert_eq!(h.engine.sync_status().next_retry_at, Some(T + 30_000));

    h.clock.advance(10_000);
    assert_eq!(
        h.engine.sync(SyncTrigger::Heartbeat).await,
        SyncOutcome::Skipped(SkipReason::Backoff)
    );
    assert_eq!(
        h.engine.sync(SyncTrigger::Foreground).await,
        SyncOutcome::Skipped(SkipReason::Backoff)
    );
    assert_eq!(h.engine.sync(SyncTrigger::Dirty).await, SyncOutcome::Pushed);
    assert_eq!(h.engine.sync_status().consecutive_failures, 0);
}

#[tokio::test]
async fn test_rejection_keeps_dirty() {
    let mut vault = registered_vault();
    vault.is_dirty = true;
    let h = harness(vault);
    h.transport
        .respond(Ok(RemoteResponse::failure("BAD_SIGNATURE", "nope")));

    let outcome = h.engine.sync(SyncTrigger::Manual).await;
    assert!(matches!(outcome, SyncOutcome::Failed(ref e) if e.contains("BAD_SIGNATURE")));
    assert!(h.engine.snapshot().is_dirty);
}

#[tokio::test]
async fn test_maintenance_skips_all_but_manual() {
    let h = harness(registered_vault());
    h.engine.vault().dispatch(Action::SetMaintenance(true)).unwrap();

    for trigger in [
        SyncTrigger::Dirty,
        SyncTrigger::Heartbeat,
        SyncTrigger::Foreground,
    ] {
        assert_eq!(
            h.engine.sync(trigger).await,
            SyncOutcome::Skipped(SkipReason::Maintenance)
        );
    }
    assert!(h.transport.requests().is_empty());

    assert_eq!(h.engine.sync(SyncTrigger::Manual).await, SyncOutcome::Fetched);
    assert!(!h.engine.snapshot().maintenance);
}

#[tokio::test]
async fn test_maintenance_blocks_edits_across_restart() {
    let h = harness(registered_vault());
    h.transport
        .respond(Ok(RemoteResponse::failure(MAINTENANCE_ACTIVE, "upgrading")));

    assert!(h.engine.claim("p1", 0).await);
    assert!(h.engine.snapshot().maintenance);
    assert_eq!(h.store.load_maintenance().unwrap(), Some(T));

    let refused = h.engine.dispatch(Action::AddPod {
        pod: NewPod::named("Game"),
        now: T,
    });
    assert!(matches!(refused, Err(Error::Maintenance)));
    let refused = h.engine.dispatch(Action::ResetTask {
        task_id: "t1".to_string(),
        now: T,
    });
    assert!(matches!(refused, Err(Error::Maintenance)));
    assert_eq!(h.engine.snapshot().pods.len(), 1);
    h.engine.shutdown().unwrap();

    // Next process on the same store starts paused.
    let restarted = Arc::new(
        Engine::new(h.clock.clone(), TimingConfig::default())
            .with_remote(RemoteClient::new(Arc::clone(&h.transport), SALT))
            .with_store(Arc::clone(&h.store)),
    );
    assert!(restarted.hydrate_from_store().unwrap());
    assert!(restarted.snapshot().maintenance);
    assert!(matches!(
        restarted.dispatch(Action::AddPod {
            pod: NewPod::named("Game"),
            now: T,
        }),
        Err(Error::Maintenance)
    ));
    assert_eq!(
        restarted.sync(SyncTrigger::Dirty).await,
        SyncOutcome::Skipped(SkipReason::Maintenance)
    );

    assert_eq!(restarted.sync(SyncTrigger::Manual).await, SyncOutcome::Pushed);
    assert!(!restarted.snapshot().maintenance);
    assert_eq!(h.store.load_maintenance().unwrap(), None);
    restarted
        .dispatch(Action::AddPod {
            pod: NewPod::named("Game"),
            now: T,
        })
        .unwrap();
    assert_eq!(restarted.snapshot().pods.len(), 2);
}

#[tokio::test]
async fn test_unregistered_vault_is_not_synced() {
    let h = harness(Vault::default());
    assert_eq!(
        h.engine.sync(SyncTrigger::Manual).await,
        SyncOutcome::Skipped(SkipReason::NotRegistered)
    );
}

#[tokio::test]
async fn test_trigger_during_flight_coalesces_into_rerun() {
    let mut vault = registered_vault();
    vault.is_dirty = true;
    let h = harness(vault);
    let gate = h.transport.hold_first_call();

    let engine = Arc::clone(&h.engine);
    let first = tokio::spawn(async move { engine.sync(SyncTrigger::Manual).await });
    while h.transport.requests().is_empty() {
        tokio::task::yield_now().await;
    }

    h.engine
        .vault()
        .dispatch(Action::AddPod {
            pod: NewPod {
                id: "p2".to_string(),
                ..NewPod::named("Game")
            },
            now: T,
        })
        .unwrap();
    assert_eq!(
        h.engine.sync(SyncTrigger::Dirty).await,
        SyncOutcome::Coalesced
    );

    gate.notify_one();
    assert_eq!(first.await.unwrap(), SyncOutcome::Pushed);

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1]["action"], json!("PUSH"));
    assert_eq!(requests[1]["vault"]["pods"][1]["id"], json!("p2"));

    let vault = h.engine.snapshot();
    assert!(!vault.is_dirty);
    assert_eq!(vault.pods.len(), 2);
    assert!(!h.engine.sync_status().in_flight);
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_debounced_sync_lets_it_finish() {
    let h = harness(registered_vault());
    let gate = h.transport.hold_first_call();
    let debounce = h.engine.timing().dirty_debounce();

    h.engine
        .dispatch(Action::AddPod {
            pod: NewPod {
                id: "p2".to_string(),
                ..NewPod::named("Game")
            },
            now: T,
        })
        .unwrap();
    tokio::time::sleep(debounce + Duration::from_millis(100)).await;
    assert_eq!(h.transport.requests().len(), 1);
    assert!(h.engine.sync_status().in_flight);
    assert!(h.engine.snapshot().is_syncing);

    // Re-arms the debounce while the first flight waits on the remote.
    h.engine
        .dispatch(Action::AddPod {
            pod: NewPod {
                id: "p3".to_string(),
                ..NewPod::named("Farm")
            },
            now: T,
        })
        .unwrap();
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = h.engine.sync_status();
    assert!(!status.in_flight);
    assert_eq!(status.last_success_at, Some(T));
    let vault = h.engine.snapshot();
    assert!(!vault.is_syncing);
    assert!(!vault.is_dirty);

    // The stale first answer was dropped and the re-run carried p3.
    let requests = h.transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1]["vault"]["pods"][2]["id"], json!("p3"));
}

#[tokio::test(start_paused = true)]
async fn test_vault_changing_through_every_rerun_rearms_dirty_sync() {
    let h = harness(registered_vault());
    let debounce = h.engine.timing().dirty_debounce();
    let vault = h.engine.vault().clone();
    h.transport.on_call(move || {
        vault
            .dispatch(Action::AddPod {
                pod: NewPod::named("Extra"),
                now: T,
            })
            .unwrap();
    });

    h.engine
        .dispatch(Action::AddPod {
            pod: NewPod::named("Game"),
            now: T,
        })
        .unwrap();
    tokio::time::sleep(debounce + Duration::from_millis(100)).await;

    // First flight plus three re-runs, every answer stale.
    assert_eq!(h.transport.requests().len(), 4);
    assert!(h.engine.snapshot().is_dirty);
    assert!(!h.engine.sync_status().in_flight);

    h.transport.clear_on_call();
    tokio::time::sleep(debounce).await;

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[4]["vault"]["pods"].as_array().unwrap().len(), 6);
    assert!(!h.engine.snapshot().is_dirty);
}

#[tokio::test]
async fn test_visibility_resync() {
    let h = harness(registered_vault());

    assert_eq!(h.engine.on_visibility_change(false).await, None);
    h.clock.advance(5_000);
    assert_eq!(h.engine.on_visibility_change(true).await, None);

    assert_eq!(h.engine.on_visibility_change(false).await, None);
    h.clock.advance(61_000);
    assert_eq!(
        h.engine.on_visibility_change(true).await,
        Some(SyncOutcome::Fetched)
    );
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_loop_stops_on_shutdown() {
    let timing = TimingConfig {
        heartbeat_min_gap_secs: 0,
        ..TimingConfig::default()
    };
    let h = harness_with(registered_vault(), timing);
    let period = h.engine.timing().heartbeat();

    h.engine
        .run_heartbeat(tokio::time::sleep(period * 2 + period / 2))
        .await;

    assert_eq!(h.transport.requests().len(), 2);
}

// ============================================
// Accounts
// ============================================

#[tokio::test]
async fn test_register_taken_nickname_leaves_vault_unregistered() {
    let h = harness(Vault::default());
    h.transport
        .respond(Ok(RemoteResponse::failure(NICKNAME_TAKEN, "taken")));

    let err = h.engine.register("neo", "1234").await.unwrap_err();
    assert!(matches!(err, Error::NicknameTaken(ref n) if n == "neo"));
    assert!(!h.engine.snapshot().is_registered());
}

#[tokio::test]
async fn test_register_pushes_identity() {
    let h = harness(Vault {
        pods: vec![pod("p1")],
        is_dirty: true,
        ..Vault::default()
    });

    h.engine.register(" neo ", "1234").await.unwrap();

    let requests = h.transport.requests();
    assert_eq!(requests[0]["action"], json!("PUSH"));
    assert_eq!(requests[0]["nickname"], json!("neo"));
    assert_eq!(requests[0]["vault"]["pods"][0]["id"], json!("p1"));
    assert_signed(&requests[0], &hash_credential("1234"));

    let vault = h.engine.snapshot();
    assert!(vault.is_registered());
    assert_eq!(vault.nickname.as_deref(), Some("neo"));
    assert!(!vault.is_dirty);
    assert_eq!(h.store.load().unwrap().unwrap().nickname.as_deref(), Some("neo"));
}

#[tokio::test]
async fn test_register_validates_input() {
    let h = harness(Vault::default());
    assert!(matches!(
        h.engine.register("", "1234").await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        h.engine.register("neo", "12").await,
        Err(Error::Validation(_))
    ));
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn test_login_replaces_local_vault() {
    let h = harness(Vault {
        pods: vec![pod("local")],
        ..Vault::default()
    });
    h.transport.respond(Ok(RemoteResponse::ok(Some(json!({
        "accountId": "acc-9",
        "nickname": "neo",
        "points": 7,
        "pods": [{"id": "remote", "name": "Remote", "createdAt": 1}]
    })))));

    h.engine.login("neo", "1234").await.unwrap();

    let vault = h.engine.snapshot();
    assert_eq!(vault.account_id.as_deref(), Some("acc-9"));
    assert_eq!(vault.hashed_pin, Some(hash_credential("1234")));
    assert_eq!(vault.pods[0].id, "remote");
    assert_eq!(vault.points, 7);
    assert!(!vault.is_dirty);
    assert_eq!(h.transport.requests()[0]["action"], json!("FETCH"));
}

#[tokio::test]
async fn test_logout_wipes_vault_and_store() {
    let h = harness(registered_vault());
    h.engine.persist_now().unwrap();

    h.engine.logout().unwrap();

    assert!(!h.engine.snapshot().is_registered());
    assert!(h.engine.snapshot().pods.is_empty());
    assert!(h.store.load().unwrap().is_none());
}
