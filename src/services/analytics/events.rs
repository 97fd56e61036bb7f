//! Telemetry Events
//!
//! Lifecycle events emitted by the orchestrator, and the sinks that accept
//! them. Emission is fire-and-forget: a sink never reports failure back to
//! the caller.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sitewatch_steps::StepKind;

/// Run and step lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        target: String,
        steps: Vec<StepKind>,
        step_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    StepCompleted {
        step_kind: StepKind,
        target: String,
        duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    StepFailed {
        step_kind: StepKind,
        target: String,
        error: String,
        duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    RunCompleted {
        target: String,
        steps: Vec<StepKind>,
        success_count: usize,
        failed_count: usize,
        total_duration_ms: u64,
    },
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepFailed { .. } => "step_failed",
            Self::RunCompleted { .. } => "run_completed",
        }
    }
}

/// Event stamped with its emission time, as delivered to a collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(flatten)]
    pub event: TelemetryEvent,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// Destination for telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Sink that keeps events in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Names of the recorded events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(TelemetryEvent::name).collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

impl TelemetrySink for RecordingSink {
    fn emit(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}
