//! Step Transport
//!
//! One POST per executed step. The transport only moves bytes; deciding
//! whether a response counts as success is the executor's job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::services::session::AuthTokenSource;
use crate::utils::error::{AppError, AppResult};

/// Raw response from a step endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Decoded JSON body, `None` when the body was not valid JSON
    pub body: Option<Value>,
}

impl TransportResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub fn undecodable(status: u16) -> Self {
        Self { status, body: None }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced an HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait StepTransport: Send + Sync {
    async fn post(&self, endpoint: &str, body: &Value) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport against the analysis API.
pub struct HttpStepTransport {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthTokenSource>,
}

impl HttpStepTransport {
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthTokenSource>) -> AppResult<Self> {
        // No request timeout: a hung analysis blocks its run until stopped.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url, auth))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        auth: Arc<dyn AuthTokenSource>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            auth,
        }
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), endpoint)
    }
}

#[async_trait]
impl StepTransport for HttpStepTransport {
    async fn post(&self, endpoint: &str, body: &Value) -> Result<TransportResponse, TransportError> {
        let url = self.url_for(endpoint);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = self.auth.token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        tracing::debug!(%url, status, bytes = bytes.len(), "step endpoint responded");
        Ok(TransportResponse {
            status,
            body: serde_json::from_slice(&bytes).ok(),
        })
    }
}

impl std::fmt::Debug for HttpStepTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStepTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}
