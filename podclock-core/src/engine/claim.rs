//! Optimistic claims
//!
//! A claim commits locally first: the due tasks of the pod advance, the
//! vault turns dirty and is written to the store, all before any network
//! I/O starts. The remote confirmation that follows may replace the vault
//! with the authoritative one, but a failure never rolls the local claim
//! back; the next sync pushes it instead.

use std::sync::Arc;

use crate::error::Error;
use crate::remote::{Credentials, RemoteTransport};
use crate::signer::SignedRequest;
use crate::vault::Action;

use super::Engine;

/// A claim committed locally and awaiting remote confirmation.
#[derive(Debug)]
pub struct ClaimFlight {
    pod_id: String,
    claimed: Vec<String>,
    base_revision: u64,
    /// Merge the confirmation. False when the vault carried unsynced edits
    /// before the claim; the remote copy would overwrite them.
    merge: bool,
    request: Option<SignedRequest>,
}

impl ClaimFlight {
    pub fn pod_id(&self) -> &str {
        &self.pod_id
    }

    /// Ids of the tasks the claim advanced.
    pub fn claimed(&self) -> &[String] {
        &self.claimed
    }

    /// Whether a remote confirmation will be requested.
    pub fn is_remote(&self) -> bool {
        self.request.is_some()
    }
}

impl<T: RemoteTransport + 'static> Engine<T> {
    /// Claim every due task of `pod_id`.
    ///
    /// Returns true if anything was claimed locally. Remote failures are
    /// logged and leave the vault dirty.
    pub async fn claim(self: &Arc<Self>, pod_id: &str, offset_ms: i64) -> bool {
        match self.begin_claim(pod_id, offset_ms) {
            Some(flight) => {
                self.finish_claim(flight).await;
                true
            }
            None => false,
        }
    }

    /// Commit the claim locally and confirm it on a spawned task.
    pub fn spawn_claim(self: &Arc<Self>, pod_id: &str, offset_ms: i64) -> bool {
        let Some(flight) = self.begin_claim(pod_id, offset_ms) else {
            return false;
        };
        if !flight.is_remote() {
            return true;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let engine = Arc::clone(self);
                runtime.spawn(async move { engine.finish_claim(flight).await });
            }
            Err(_) => {
                tracing::warn!(pod_id, "No runtime, claim confirmation left to the next sync");
            }
        }
        true
    }

    /// The synchronous half of a claim: local mutation and persist.
    pub fn begin_claim(&self, pod_id: &str, offset_ms: i64) -> Option<ClaimFlight> {
        let (maintenance, was_dirty) = self.vault.read(|v| (v.maintenance, v.is_dirty));
        if maintenance {
            tracing::info!(pod_id, "Claim refused, remote is in maintenance mode");
            return None;
        }

        let now = self.clock.now_ms();
        let outcome = match self.vault.dispatch(Action::ClaimPod {
            pod_id: pod_id.to_string(),
            now,
            offset_ms,
            grace_ms: self.timing.claim_grace_ms,
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(pod_id, error = %e, "Claim rejected");
                return None;
            }
        };
        if outcome.claimed.is_empty() {
            tracing::debug!(pod_id, "Nothing due to claim");
            return None;
        }
        tracing::info!(
            pod_id,
            tasks = outcome.claimed.len(),
            offset_ms,
            "Claim committed locally"
        );

        self.persist_logged();

        let request = match (&self.remote, self.vault.read(Credentials::from_vault)) {
            (Some(remote), Some(credentials)) => {
                match remote.claim_request(&credentials, pod_id, offset_ms, now) {
                    Ok(request) => Some(request),
                    Err(e) => {
                        tracing::error!(pod_id, error = %e, "Failed to sign claim");
                        None
                    }
                }
            }
            (None, _) => None,
            (Some(_), None) => {
                tracing::debug!(pod_id, "Vault not registered, claim stays local");
                None
            }
        };

        Some(ClaimFlight {
            pod_id: pod_id.to_string(),
            claimed: outcome.claimed,
            base_revision: outcome.revision,
            merge: !was_dirty,
            request,
        })
    }

    /// The asynchronous half of a claim: remote confirmation.
    pub async fn finish_claim(self: &Arc<Self>, flight: ClaimFlight) {
        let ClaimFlight {
            pod_id,
            claimed,
            base_revision,
            merge,
            request,
        } = flight;
        let (Some(remote), Some(request)) = (&self.remote, request) else {
            return;
        };

        let result = remote.send(request).await;
        let now = self.clock.now_ms();

        match result {
            Ok(patch) => {
                self.note_remote_success(now);
                if !merge {
                    tracing::info!(pod_id = %pod_id, "Claim confirmed, pushing earlier edits");
                    self.schedule_dirty_sync();
                    return;
                }
                match self.vault.dispatch(Action::ApplyServer {
                    patch: patch.unwrap_or_default(),
                    base_revision,
                    now,
                }) {
                    Ok(d) if d.stale => {
                        tracing::info!(pod_id = %pod_id, "Claim confirmed, vault changed meanwhile");
                        self.schedule_dirty_sync();
                    }
                    Ok(_) => {
                        self.persist_logged();
                        tracing::info!(pod_id = %pod_id, tasks = claimed.len(), "Claim confirmed");
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to merge claim response"),
                }
            }
            Err(Error::Maintenance) => {
                tracing::warn!(pod_id = %pod_id, "Claim hit maintenance mode, keeping local state");
                self.set_maintenance(true);
            }
            Err(e) => {
                let backoff_ms = self.note_remote_failure(now);
                tracing::warn!(
                    pod_id = %pod_id,
                    error = %e,
                    backoff_ms,
                    "Claim confirmation failed, keeping local state"
                );
                self.schedule_dirty_sync();
            }
        }
    }
}
