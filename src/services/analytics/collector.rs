//! Telemetry Collectors
//!
//! Delivery targets for batches flushed by the `TelemetryTracker`.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::events::TelemetryRecord;
use crate::utils::error::{AppError, AppResult};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Receives batches of telemetry records.
#[async_trait]
pub trait TelemetryCollector: Send + Sync {
    async fn deliver(&self, batch: &[TelemetryRecord]) -> AppResult<()>;
}

#[derive(Serialize)]
struct BatchBody<'a> {
    events: &'a [TelemetryRecord],
}

/// POSTs each batch as `{ "events": [...] }` to an analytics endpoint.
pub struct HttpCollector {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCollector {
    pub fn new(endpoint: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TelemetryCollector for HttpCollector {
    async fn deliver(&self, batch: &[TelemetryRecord]) -> AppResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&BatchBody { events: batch })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::network(format!(
                "analytics collector returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

/// Writes every record through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCollector;

#[async_trait]
impl TelemetryCollector for LogCollector {
    async fn deliver(&self, batch: &[TelemetryRecord]) -> AppResult<()> {
        for record in batch {
            let payload = serde_json::to_string(record)?;
            tracing::info!(
                target: "sitewatch::telemetry",
                event = record.event.name(),
                payload = %payload,
                "telemetry"
            );
        }
        Ok(())
    }
}

/// Keeps delivered batches in memory.
#[derive(Debug, Default)]
pub struct MemoryCollector {
    batches: Mutex<Vec<Vec<TelemetryRecord>>>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<TelemetryRecord>> {
        self.batches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl TelemetryCollector for MemoryCollector {
    async fn deliver(&self, batch: &[TelemetryRecord]) -> AppResult<()> {
        self.batches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(batch.to_vec());
        Ok(())
    }
}
