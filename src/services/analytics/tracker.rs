//! Telemetry Tracker
//!
//! Non-blocking telemetry delivery. `emit` pushes onto a bounded channel; a
//! background task buffers records and flushes them to a collector when the
//! buffer fills, on a fixed interval, on explicit flush, or at shutdown.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::collector::TelemetryCollector;
use super::events::{TelemetryEvent, TelemetryRecord, TelemetrySink};
use crate::utils::error::{AppError, AppResult};

/// Message type for the tracker channel
#[derive(Debug)]
pub enum TrackerMessage {
    Track(TelemetryRecord),
    /// Flush buffered records; the sender is signalled once delivery finished
    Flush(oneshot::Sender<()>),
    /// Flush and stop the background task
    Shutdown,
}

/// Configuration for the telemetry tracker
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Buffer size before auto-flush
    pub buffer_size: usize,
    /// Flush interval in seconds
    pub flush_interval_secs: u64,
    /// Channel capacity; events beyond it are dropped
    pub channel_capacity: usize,
    pub enabled: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 50,
            flush_interval_secs: 30,
            channel_capacity: 1000,
            enabled: true,
        }
    }
}

/// Buffered, fire-and-forget telemetry sink.
pub struct TelemetryTracker {
    sender: mpsc::Sender<TrackerMessage>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
    config: TrackerConfig,
}

impl TelemetryTracker {
    /// Create a tracker and spawn its background task on the current runtime.
    pub fn new(collector: Arc<dyn TelemetryCollector>, config: TrackerConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<TrackerMessage>(config.channel_capacity.max(1));

        let worker_config = config.clone();
        let worker = tokio::spawn(async move {
            Self::process_messages(receiver, collector, worker_config).await;
        });

        Self {
            sender,
            worker: std::sync::Mutex::new(Some(worker)),
            config,
        }
    }

    async fn process_messages(
        mut receiver: mpsc::Receiver<TrackerMessage>,
        collector: Arc<dyn TelemetryCollector>,
        config: TrackerConfig,
    ) {
        let mut buffer: Vec<TelemetryRecord> = Vec::with_capacity(config.buffer_size);
        let mut flush_interval = tokio::time::interval(tokio::time::Duration::from_secs(
            config.flush_interval_secs.max(1),
        ));
        // The first tick completes immediately.
        flush_interval.tick().await;

        loop {
            tokio::select! {
                msg = receiver.recv() => {
                    match msg {
                        Some(TrackerMessage::Track(record)) => {
                            buffer.push(record);
                            if buffer.len() >= config.buffer_size {
                                Self::flush_buffer(collector.as_ref(), &mut buffer).await;
                            }
                        }
                        Some(TrackerMessage::Flush(done)) => {
                            Self::flush_buffer(collector.as_ref(), &mut buffer).await;
                            let _ = done.send(());
                        }
                        Some(TrackerMessage::Shutdown) | None => {
                            Self::flush_buffer(collector.as_ref(), &mut buffer).await;
                            break;
                        }
                    }
                }
                _ = flush_interval.tick() => {
                    if !buffer.is_empty() {
                        Self::flush_buffer(collector.as_ref(), &mut buffer).await;
                    }
                }
            }
        }
    }

    async fn flush_buffer(collector: &dyn TelemetryCollector, buffer: &mut Vec<TelemetryRecord>) {
        if buffer.is_empty() {
            return;
        }

        match collector.deliver(buffer).await {
            Ok(()) => {
                tracing::debug!("Delivered {} telemetry records", buffer.len());
            }
            Err(e) => {
                tracing::warn!("Failed to deliver {} telemetry records: {}", buffer.len(), e);
            }
        }

        buffer.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush buffered records and wait until the collector has been called.
    pub async fn flush(&self) -> AppResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.sender
            .send(TrackerMessage::Flush(done_tx))
            .await
            .map_err(|_| AppError::internal("Telemetry tracker has stopped"))?;
        done_rx
            .await
            .map_err(|_| AppError::internal("Telemetry tracker stopped before flushing"))
    }

    /// Flush remaining records and stop the background task.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.sender
            .send(TrackerMessage::Shutdown)
            .await
            .map_err(|_| AppError::internal("Telemetry tracker has stopped"))?;

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| AppError::internal(format!("Telemetry task failed: {}", e)))?;
        }
        Ok(())
    }
}

impl TelemetrySink for TelemetryTracker {
    fn emit(&self, event: TelemetryEvent) {
        if !self.config.enabled {
            return;
        }
        let record = TelemetryRecord {
            event,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.sender.try_send(TrackerMessage::Track(record)) {
            tracing::warn!("Dropping telemetry event: {}", e);
        }
    }
}

impl std::fmt::Debug for TelemetryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryTracker")
            .field("config", &self.config)
            .finish()
    }
}
