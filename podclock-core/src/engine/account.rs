//! Account lifecycle: register, login, logout.
//!
//! Unlike claims and syncs these are direct user commands, so failures are
//! returned to the caller instead of being absorbed.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::remote::{Credentials, RemoteClient, RemoteTransport};
use crate::signer::hash_credential;
use crate::types::{PersistedVault, Vault};
use crate::vault::Action;

use super::Engine;

/// Shortest PIN accepted at registration
pub const MIN_PIN_LEN: usize = 4;

impl<T: RemoteTransport + 'static> Engine<T> {
    fn require_remote(&self) -> Result<&RemoteClient<T>> {
        self.remote
            .as_ref()
            .ok_or_else(|| Error::Config("remote.endpoint is not configured".to_string()))
    }

    /// Create an account for the current vault and upload it.
    ///
    /// The identity is only kept once the remote accepts it, so a taken
    /// nickname leaves the vault unregistered.
    pub async fn register(self: &Arc<Self>, nickname: &str, pin: &str) -> Result<()> {
        let remote = self.require_remote()?;
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(Error::Validation("nickname must not be empty".to_string()));
        }
        if pin.trim().len() < MIN_PIN_LEN {
            return Err(Error::Validation(format!(
                "PIN must have at least {} characters",
                MIN_PIN_LEN
            )));
        }
        if self.vault.read(Vault::is_registered) {
            return Err(Error::Validation(
                "vault is already registered, log out first".to_string(),
            ));
        }

        let credentials = Credentials {
            account_id: uuid::Uuid::new_v4().to_string(),
            nickname: nickname.to_string(),
            hashed_pin: hash_credential(pin),
        };
        let now = self.clock.now_ms();
        let (request, base_revision) = self.vault.read_with_revision(|vault, revision| {
            let mut persisted = vault.to_persisted();
            persisted.account_id = Some(credentials.account_id.clone());
            persisted.nickname = Some(credentials.nickname.clone());
            persisted.hashed_pin = Some(credentials.hashed_pin.clone());
            remote
                .push_request(&credentials, &persisted, now)
                .map(|r| (r, revision))
        })?;

        let patch = match remote.send(request).await {
            Ok(patch) => patch,
            Err(Error::NicknameTaken(_)) => {
                tracing::info!(nickname, "Registration refused, nickname taken");
                return Err(Error::NicknameTaken(nickname.to_string()));
            }
            Err(e) => return Err(e),
        };
        let landed_at = self.clock.now_ms();
        self.note_remote_success(landed_at);

        let identity = self.vault.dispatch(Action::SetIdentity {
            account_id: credentials.account_id.clone(),
            nickname: credentials.nickname.clone(),
            hashed_pin: credentials.hashed_pin,
        })?;
        // The response describes the vault as it was sent; it only applies
        // if nothing but the identity changed since.
        let base = if identity.revision == base_revision + 1 {
            identity.revision
        } else {
            base_revision
        };
        let applied = self.vault.dispatch(Action::ApplyServer {
            patch: patch.unwrap_or_default(),
            base_revision: base,
            now: landed_at,
        })?;
        if applied.stale {
            self.schedule_dirty_sync();
        }
        self.persist_now()?;

        tracing::info!(
            account_id = %credentials.account_id,
            nickname,
            "Account registered"
        );
        Ok(())
    }

    /// Replace the local vault with the remote one for `nickname`.
    ///
    /// Refused while another account is active. Unregistered local data is
    /// discarded.
    pub async fn login(&self, nickname: &str, pin: &str) -> Result<()> {
        let remote = self.require_remote()?;
        let nickname = nickname.trim();
        if self.vault.read(Vault::is_registered) {
            return Err(Error::Validation(
                "vault is already registered, log out first".to_string(),
            ));
        }

        let hashed_pin = hash_credential(pin);
        let patch = remote
            .fetch(nickname, &hashed_pin, self.clock.now_ms())
            .await?;
        let account_id = patch
            .account_id
            .clone()
            .ok_or_else(|| Error::Remote("FETCH response carried no account id".to_string()))?;
        let now = self.clock.now_ms();
        self.note_remote_success(now);

        let (pods, tasks) = self.vault.read(|v| (v.pods.len(), v.tasks.len()));
        if pods + tasks > 0 {
            tracing::warn!(pods, tasks, "Discarding unregistered local vault on login");
        }

        let nickname = patch.nickname.clone().unwrap_or_else(|| nickname.to_string());
        let mut vault = Vault {
            account_id: Some(account_id.clone()),
            nickname: Some(nickname),
            hashed_pin: Some(hashed_pin),
            ..Vault::default()
        };
        vault.apply_patch(patch);
        let persisted = PersistedVault {
            is_dirty: false,
            last_synced_at: Some(now),
            ..vault.to_persisted()
        };

        self.vault.dispatch(Action::Hydrate(persisted))?;
        self.persist_now()?;
        tracing::info!(account_id = %account_id, "Logged in");
        Ok(())
    }

    /// Forget the account and every local record of it.
    pub fn logout(&self) -> Result<()> {
        let (registered, dirty) = self.vault.read(|v| (v.is_registered(), v.is_dirty));
        if registered && dirty {
            tracing::warn!("Logging out with unsynced changes");
        }
        self.dirty_task.cancel();
        self.persist_task.cancel();
        self.vault.dispatch(Action::Wipe)?;
        if let Some(store) = &self.store {
            store.clear()?;
        }
        tracing::info!("Logged out");
        Ok(())
    }
}
