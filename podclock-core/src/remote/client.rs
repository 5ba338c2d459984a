//! HTTP transport for the remote vault endpoint

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::signer::SignedRequest;

use super::{RemoteResponse, RemoteTransport};

/// reqwest-backed [`RemoteTransport`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a transport from configuration
    ///
    /// Returns an error if the configuration is invalid or has no endpoint.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        config.validate()?;

        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("remote.endpoint is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl RemoteTransport for HttpTransport {
    async fn call(&self, request: &SignedRequest) -> Result<RemoteResponse> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(request.body())
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_send_error)?;

        if !status.is_success() {
            return Err(Error::Remote(format!(
                "API error ({}): {}",
                status,
                truncate(&text, 200)
            )));
        }

        serde_json::from_str(&text).map_err(|e| {
            Error::Remote(format!(
                "non-JSON response ({}): {}",
                e,
                truncate(&text, 200)
            ))
        })
    }
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::SyncTimeout
    } else {
        Error::Remote(format!("HTTP request failed: {}", e))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
