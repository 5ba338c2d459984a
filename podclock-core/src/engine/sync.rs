//! Sync reconciler
//!
//! A sync either pushes the local vault (when dirty) or fetches the remote
//! one (when clean), then merges the response wholesale. Only one sync runs
//! at a time; triggers that arrive during a flight are coalesced into a
//! single re-run once it lands.
//!
//! Suppression rules by trigger:
//!
//! | trigger    | maintenance | recently synced | error backoff |
//! |------------|-------------|-----------------|---------------|
//! | Dirty      | skipped     | runs            | runs          |
//! | Heartbeat  | skipped     | skipped*        | skipped       |
//! | Foreground | skipped     | runs            | skipped       |
//! | Manual     | runs        | runs            | runs          |
//!
//! *only while the vault is clean.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

use serde::Serialize;
use tokio::time::MissedTickBehavior;

use crate::error::Error;
use crate::remote::{Credentials, RemoteTransport};
use crate::signer::SignedRequest;
use crate::vault::Action;

use super::Engine;

/// Backoff after the first consecutive failure
pub const BACKOFF_BASE_MS: i64 = 30_000;

/// Backoff ceiling
pub const BACKOFF_MAX_MS: i64 = 300_000;

/// Re-runs allowed after one flight before handing off to the next trigger
const MAX_RERUNS: u32 = 3;

/// What asked for a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Debounced follow-up to a local mutation
    Dirty,
    /// Periodic timer
    Heartbeat,
    /// The front end became visible again
    Foreground,
    /// Explicit user request
    Manual,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Dirty => "dirty",
            SyncTrigger::Heartbeat => "heartbeat",
            SyncTrigger::Foreground => "foreground",
            SyncTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a sync did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No remote endpoint configured
    Offline,
    /// The vault has no account yet
    NotRegistered,
    Maintenance,
    /// Heartbeat on a clean vault shortly after a successful sync
    RecentlySynced,
    /// Inside the error backoff window
    Backoff,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Offline => "offline",
            SkipReason::NotRegistered => "not_registered",
            SkipReason::Maintenance => "maintenance",
            SkipReason::RecentlySynced => "recently_synced",
            SkipReason::Backoff => "backoff",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`Engine::sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local vault uploaded and the response merged
    Pushed,
    /// Remote vault downloaded and merged
    Fetched,
    /// The response was dropped because the vault changed mid-flight
    Stale,
    /// Another sync was in flight; it will re-run once
    Coalesced,
    Skipped(SkipReason),
    /// The remote reported maintenance mode
    Maintenance,
    /// Transport or remote failure; the vault keeps its dirty state
    Failed(String),
}

impl SyncOutcome {
    /// True if remote state was merged.
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Pushed | SyncOutcome::Fetched)
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Pushed => f.write_str("pushed"),
            SyncOutcome::Fetched => f.write_str("fetched"),
            SyncOutcome::Stale => f.write_str("stale"),
            SyncOutcome::Coalesced => f.write_str("coalesced"),
            SyncOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            SyncOutcome::Maintenance => f.write_str("maintenance"),
            SyncOutcome::Failed(error) => write!(f, "failed: {}", error),
        }
    }
}

/// Point-in-time view of the reconciler, for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub in_flight: bool,
    pub last_success_at: Option<i64>,
    pub consecutive_failures: u32,
    pub next_retry_at: Option<i64>,
}

/// Reconciler bookkeeping. Timestamps use 0 for "unset".
#[derive(Debug, Default)]
pub(crate) struct SyncState {
    in_flight: AtomicBool,
    pending: AtomicBool,
    last_success_at: AtomicI64,
    consecutive_failures: AtomicU32,
    next_retry_at: AtomicI64,
    hidden_since: AtomicI64,
}

impl SyncState {
    fn record_success(&self, now: i64) {
        self.last_success_at.store(now, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.next_retry_at.store(0, Ordering::SeqCst);
    }

    /// Returns the backoff now in effect.
    fn record_failure(&self, now: i64) -> i64 {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let backoff = backoff_ms(failures);
        self.next_retry_at.store(now + backoff, Ordering::SeqCst);
        backoff
    }

    fn last_success_at(&self) -> Option<i64> {
        match self.last_success_at.load(Ordering::SeqCst) {
            0 => None,
            at => Some(at),
        }
    }

    fn next_retry_at(&self) -> Option<i64> {
        match self.next_retry_at.load(Ordering::SeqCst) {
            0 => None,
            at => Some(at),
        }
    }
}

/// Backoff after `failures` consecutive failures.
pub fn backoff_ms(failures: u32) -> i64 {
    if failures == 0 {
        return 0;
    }
    let doublings = (failures - 1).min(16);
    BACKOFF_BASE_MS
        .saturating_mul(1_i64 << doublings)
        .min(BACKOFF_MAX_MS)
}

/// Releases the in-flight flag when the flight ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Push,
    Fetch,
}

impl<T: RemoteTransport + 'static> Engine<T> {
    /// Run one sync for `trigger`. Never fails; the outcome says what
    /// happened and errors are logged.
    pub async fn sync(&self, trigger: SyncTrigger) -> SyncOutcome {
        let now = self.clock.now_ms();
        if let Some(reason) = self.skip_reason(trigger, now) {
            tracing::debug!(trigger = %trigger, reason = %reason, "Sync skipped");
            return SyncOutcome::Skipped(reason);
        }

        if self.sync_state.in_flight.swap(true, Ordering::SeqCst) {
            self.sync_state.pending.store(true, Ordering::SeqCst);
            tracing::debug!(trigger = %trigger, "Sync already in flight, coalesced");
            return SyncOutcome::Coalesced;
        }
        let _flight = FlightGuard(&self.sync_state.in_flight);
        self.sync_state.pending.store(false, Ordering::SeqCst);
        self.mark(Action::SetSyncing(true));

        let mut outcome = self.sync_once(trigger).await;
        let mut reruns = 0;
        loop {
            let pending = self.sync_state.pending.swap(false, Ordering::SeqCst);
            let rerun = match outcome {
                SyncOutcome::Stale => true,
                SyncOutcome::Pushed | SyncOutcome::Fetched => pending,
                _ => false,
            };
            if !rerun {
                break;
            }
            if reruns >= MAX_RERUNS {
                // Left for the follow-up scheduled by the dirty debounce.
                self.sync_state.pending.store(true, Ordering::SeqCst);
                tracing::warn!(reruns, "Vault still changing after sync re-runs, deferring");
                break;
            }
            reruns += 1;
            if let Some(reason) = self.skip_reason(SyncTrigger::Dirty, self.clock.now_ms()) {
                outcome = SyncOutcome::Skipped(reason);
                break;
            }
            tracing::debug!(rerun = reruns, "Re-running sync for changes made in flight");
            outcome = self.sync_once(SyncTrigger::Dirty).await;
        }

        self.mark(Action::SetSyncing(false));
        tracing::info!(trigger = %trigger, outcome = %outcome, reruns, "Sync finished");
        outcome
    }

    fn skip_reason(&self, trigger: SyncTrigger, now: i64) -> Option<SkipReason> {
        if self.remote.is_none() {
            return Some(SkipReason::Offline);
        }
        let (maintenance, registered, dirty) = self
            .vault
            .read(|v| (v.maintenance, v.is_registered(), v.is_dirty));

        if maintenance && trigger != SyncTrigger::Manual {
            return Some(SkipReason::Maintenance);
        }
        if !registered {
            return Some(SkipReason::NotRegistered);
        }
        if trigger == SyncTrigger::Heartbeat && !dirty {
            if let Some(last) = self.sync_state.last_success_at() {
                if now - last < self.timing.heartbeat_min_gap_ms() {
                    return Some(SkipReason::RecentlySynced);
                }
            }
        }
        if matches!(trigger, SyncTrigger::Heartbeat | SyncTrigger::Foreground) {
            if let Some(retry_at) = self.sync_state.next_retry_at() {
                if now < retry_at {
                    return Some(SkipReason::Backoff);
                }
            }
        }
        None
    }

    async fn sync_once(&self, trigger: SyncTrigger) -> SyncOutcome {
        let Some(remote) = &self.remote else {
            return SyncOutcome::Skipped(SkipReason::Offline);
        };
        let now = self.clock.now_ms();

        let prepared = self.vault.read_with_revision(|vault, revision| {
            let credentials = Credentials::from_vault(vault)?;
            let request = if vault.is_dirty {
                remote
                    .push_request(&credentials, &vault.to_persisted(), now)
                    .map(|r| (r, Direction::Push))
            } else {
                remote
                    .fetch_request(&credentials.nickname, &credentials.hashed_pin, now)
                    .map(|r| (r, Direction::Fetch))
            };
            Some(request.map(|(r, d)| (r, d, revision)))
        });

        let (request, direction, base_revision): (SignedRequest, Direction, u64) = match prepared {
            None => return SyncOutcome::Skipped(SkipReason::NotRegistered),
            Some(Ok(prepared)) => prepared,
            Some(Err(e)) => {
                tracing::error!(error = %e, "Failed to build sync request");
                return SyncOutcome::Failed(e.to_string());
            }
        };

        let result = match (remote.send(request).await, direction) {
            (Ok(None), Direction::Fetch) => Err(Error::Remote(
                "FETCH response carried no vault".to_string(),
            )),
            (result, _) => result,
        };
        let landed_at = self.clock.now_ms();

        match result {
            Ok(patch) => {
                self.sync_state.record_success(landed_at);
                if self.vault.read(|v| v.maintenance) {
                    tracing::info!("Remote answered, leaving maintenance mode");
                    self.set_maintenance(false);
                }
                let applied = self.vault.dispatch(Action::ApplyServer {
                    patch: patch.unwrap_or_default(),
                    base_revision,
                    now: landed_at,
                });
                match applied {
                    Ok(d) if d.stale => SyncOutcome::Stale,
                    Ok(_) => {
                        self.persist_logged();
                        match direction {
                            Direction::Push => SyncOutcome::Pushed,
                            Direction::Fetch => SyncOutcome::Fetched,
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to merge remote vault");
                        SyncOutcome::Failed(e.to_string())
                    }
                }
            }
            Err(Error::Maintenance) => {
                tracing::warn!(trigger = %trigger, "Remote is in maintenance mode");
                self.set_maintenance(true);
                SyncOutcome::Maintenance
            }
            Err(e) => {
                let backoff_ms = self.sync_state.record_failure(landed_at);
                tracing::warn!(
                    trigger = %trigger,
                    error = %e,
                    transient = e.is_transient(),
                    backoff_ms,
                    "Sync failed, keeping local state"
                );
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    /// Take the request for another sync left by a flight that ended with
    /// work outstanding.
    pub(crate) fn take_follow_up(&self) -> bool {
        !self.sync_state.in_flight.load(Ordering::SeqCst)
            && self.sync_state.pending.swap(false, Ordering::SeqCst)
    }

    /// Dispatch a flag-only action. These cannot fail.
    pub(crate) fn mark(&self, action: Action) {
        if let Err(e) = self.vault.dispatch(action) {
            tracing::warn!(error = %e, "Vault flag update failed");
        }
    }

    /// Flip maintenance mode and the store marker together.
    pub(crate) fn set_maintenance(&self, on: bool) {
        self.mark(Action::SetMaintenance(on));
        let Some(store) = &self.store else {
            return;
        };
        let now = self.clock.now_ms();
        let saved = match (on, store.load_maintenance()) {
            // Keep the time maintenance was first seen.
            (true, Ok(Some(_))) => Ok(()),
            (true, _) => store.save_maintenance(Some(now), now),
            (false, _) => store.save_maintenance(None, now),
        };
        if let Err(e) = saved {
            tracing::error!(error = %e, "Failed to persist maintenance marker");
        }
    }

    /// Feed a successful remote answer obtained outside [`Engine::sync`].
    pub(crate) fn note_remote_success(&self, now: i64) {
        self.sync_state.record_success(now);
    }

    /// Feed a failed remote call obtained outside [`Engine::sync`].
    pub(crate) fn note_remote_failure(&self, now: i64) -> i64 {
        self.sync_state.record_failure(now)
    }

    pub fn sync_status(&self) -> SyncStatus {
        SyncStatus {
            in_flight: self.sync_state.in_flight.load(Ordering::SeqCst),
            last_success_at: self.sync_state.last_success_at(),
            consecutive_failures: self.sync_state.consecutive_failures.load(Ordering::SeqCst),
            next_retry_at: self.sync_state.next_retry_at(),
        }
    }

    /// Sync on a fixed period until `shutdown` resolves.
    pub async fn run_heartbeat<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let period = self.timing.heartbeat();
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(period_secs = period.as_secs(), "Heartbeat started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.sync(SyncTrigger::Heartbeat).await;
                }
            }
        }
        tracing::info!("Heartbeat stopped");
    }

    /// Track front-end visibility.
    ///
    /// Becoming visible after a long absence, or with unsynced changes,
    /// runs a `Foreground` sync and returns its outcome.
    pub async fn on_visibility_change(&self, visible: bool) -> Option<SyncOutcome> {
        let now = self.clock.now_ms();
        if !visible {
            self.sync_state.hidden_since.store(now, Ordering::SeqCst);
            return None;
        }

        let hidden_since = self.sync_state.hidden_since.swap(0, Ordering::SeqCst);
        let away_long = hidden_since != 0 && now - hidden_since > self.timing.foreground_resync_ms();
        let dirty = self.vault.read(|v| v.is_dirty);
        if away_long || dirty {
            Some(self.sync(SyncTrigger::Foreground).await)
        } else {
            None
        }
    }
}
