//! Remote vault RPC
//!
//! The remote is one POST endpoint taking a signed JSON body. Three
//! opcodes are used:
//!
//! - `PUSH` uploads the full persisted vault
//! - `FETCH` pulls the vault by nickname and hashed credential (login)
//! - `CLAIM_POD` records a claim and returns the authoritative vault
//!
//! Every response has the same envelope, see [`RemoteResponse`].

pub mod client;

pub use client::HttpTransport;

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::signer::SignedRequest;
use crate::types::{PersistedVault, Vault, VaultPatch};

/// Error code sent while the remote refuses writes
pub const MAINTENANCE_ACTIVE: &str = "MAINTENANCE_ACTIVE";

/// Error code sent when registering an existing nickname
pub const NICKNAME_TAKEN: &str = "NICKNAME_TAKEN";

/// Something that can deliver a signed request and return the envelope.
pub trait RemoteTransport: Send + Sync {
    fn call(&self, request: &SignedRequest) -> impl Future<Output = Result<RemoteResponse>> + Send;
}

impl<T: RemoteTransport> RemoteTransport for Arc<T> {
    fn call(&self, request: &SignedRequest) -> impl Future<Output = Result<RemoteResponse>> + Send {
        (**self).call(request)
    }
}

/// Response envelope: `{success, vault?, error?, message?}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RemoteResponse {
    /// A successful response carrying `vault`.
    pub fn ok(vault: Option<Value>) -> Self {
        Self {
            success: true,
            vault,
            ..Default::default()
        }
    }

    /// A failed response with `code`.
    pub fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(code.to_string()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Map the envelope to the returned vault, or to the error it signals.
    pub fn into_patch(self) -> Result<Option<VaultPatch>> {
        if !self.success {
            let code = self.error.unwrap_or_else(|| "UNKNOWN".to_string());
            let message = self.message.unwrap_or_default();
            return Err(match code.as_str() {
                MAINTENANCE_ACTIVE => Error::Maintenance,
                NICKNAME_TAKEN => Error::NicknameTaken(message),
                _ => Error::Rejected { code, message },
            });
        }

        match self.vault {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Remote(format!("malformed vault in response: {}", e))),
        }
    }
}

/// Account identity used to sign requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_id: String,
    pub nickname: String,
    pub hashed_pin: String,
}

impl Credentials {
    /// Identity of a registered vault.
    pub fn from_vault(vault: &Vault) -> Option<Self> {
        Some(Self {
            account_id: vault.account_id.clone()?,
            nickname: vault.nickname.clone().unwrap_or_default(),
            hashed_pin: vault.hashed_pin.clone()?,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushPayload<'a> {
    action: &'static str,
    account_id: &'a str,
    nickname: &'a str,
    hashed_pin: &'a str,
    vault: &'a PersistedVault,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchPayload<'a> {
    action: &'static str,
    nickname: &'a str,
    hashed_pin: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimPodPayload<'a> {
    action: &'static str,
    account_id: &'a str,
    hashed_pin: &'a str,
    app_id: &'a str,
    offset_ms: i64,
}

/// Builds signed requests and interprets responses.
///
/// Requests are signed when built, so the returned futures own everything
/// they need and no vault state is borrowed across the network call.
#[derive(Debug)]
pub struct RemoteClient<T> {
    transport: T,
    salt: String,
}

impl<T: RemoteTransport> RemoteClient<T> {
    pub fn new(transport: T, salt: impl Into<String>) -> Self {
        Self {
            transport,
            salt: salt.into(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sign a `PUSH` of the full vault.
    pub fn push_request(
        &self,
        credentials: &Credentials,
        vault: &PersistedVault,
        timestamp: i64,
    ) -> Result<SignedRequest> {
        SignedRequest::new(
            &PushPayload {
                action: "PUSH",
                account_id: &credentials.account_id,
                nickname: &credentials.nickname,
                hashed_pin: &credentials.hashed_pin,
                vault,
            },
            &credentials.hashed_pin,
            timestamp,
            &self.salt,
        )
    }

    /// Sign a `FETCH` by nickname.
    pub fn fetch_request(
        &self,
        nickname: &str,
        hashed_pin: &str,
        timestamp: i64,
    ) -> Result<SignedRequest> {
        SignedRequest::new(
            &FetchPayload {
                action: "FETCH",
                nickname,
                hashed_pin,
            },
            hashed_pin,
            timestamp,
            &self.salt,
        )
    }

    /// Sign a `CLAIM_POD`.
    pub fn claim_request(
        &self,
        credentials: &Credentials,
        pod_id: &str,
        offset_ms: i64,
        timestamp: i64,
    ) -> Result<SignedRequest> {
        SignedRequest::new(
            &ClaimPodPayload {
                action: "CLAIM_POD",
                account_id: &credentials.account_id,
                hashed_pin: &credentials.hashed_pin,
                app_id: pod_id,
                offset_ms,
            },
            &credentials.hashed_pin,
            timestamp,
            &self.salt,
        )
    }

    /// Deliver a signed request and map the envelope.
    pub async fn send(&self, request: SignedRequest) -> Result<Option<VaultPatch>> {
        let action = request.action().unwrap_or("?").to_string();
        tracing::debug!(action = %action, ts = request.timestamp(), "Sending remote request");
        let result = self.transport.call(&request).await?.into_patch();
        if let Err(e) = &result {
            tracing::debug!(action = %action, error = %e, "Remote refused request");
        }
        result
    }

    pub async fn push(
        &self,
        credentials: &Credentials,
        vault: &PersistedVault,
        timestamp: i64,
    ) -> Result<Option<VaultPatch>> {
        let request = self.push_request(credentials, vault, timestamp)?;
        self.send(request).await
    }

    /// Pull the vault. A success without a vault is an error here.
    pub async fn fetch(
        &self,
        nickname: &str,
        hashed_pin: &str,
        timestamp: i64,
    ) -> Result<VaultPatch> {
        let request = self.fetch_request(nickname, hashed_pin, timestamp)?;
        self.send(request)
            .await?
            .ok_or_else(|| Error::Remote("FETCH response carried no vault".to_string()))
    }

    pub async fn claim_pod(
        &self,
        credentials: &Credentials,
        pod_id: &str,
        offset_ms: i64,
        timestamp: i64,
    ) -> Result<Option<VaultPatch>> {
        let request = self.claim_request(credentials, pod_id, offset_ms, timestamp)?;
        self.send(request).await
    }
}
