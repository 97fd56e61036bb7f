//! Step Executor
//!
//! Runs a single step: builds its request from the latest snapshot, makes
//! one transport call, classifies the response and writes the outcome back.
//! Every write-back is tagged with the run id and dropped if the run is no
//! longer current. Failures are contained here and never abort the run.

use std::sync::Arc;

use serde_json::Value;
use sitewatch_steps::{DependencyUnmet, StepKind, StepRegistry};
use thiserror::Error;

use super::run_state::SharedRunState;
use super::transport::{StepTransport, TransportResponse};
use crate::services::analytics::{TelemetryEvent, TelemetrySink};
use crate::storage::snapshot_store::now_ms;

/// Why a step ended in `error`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    /// The call never reached the remote, or the transport failed
    #[error("network error: {0}")]
    Network(String),
    /// Non-2xx status
    #[error("{message}")]
    Http { status: u16, message: String },
    /// 2xx status with a failure indicator in the body
    #[error("{0}")]
    Payload(String),
    #[error(transparent)]
    DependencyUnmet(#[from] DependencyUnmet),
}

/// What happened to a step from the run's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Succeeded,
    Failed(StepError),
    /// The run stopped being current; nothing was written
    Discarded,
}

pub struct StepExecutor {
    registry: Arc<StepRegistry>,
    transport: Arc<dyn StepTransport>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<StepRegistry>,
        transport: Arc<dyn StepTransport>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            registry,
            transport,
            telemetry,
        }
    }

    pub async fn execute(
        &self,
        state: &SharedRunState,
        kind: StepKind,
        target: &str,
        run_id: u64,
    ) -> StepOutcome {
        let request = state.read(|s| self.registry.build_request(kind, target, &s.steps));
        let body = match request {
            Ok(body) => body,
            Err(unmet) => return self.fail_unmet(state, unmet, run_id),
        };

        let started = state.mutate_if_current(run_id, |s| s.steps.set_running(kind, now_ms()));
        match started {
            None => return StepOutcome::Discarded,
            Some(Err(e)) => {
                tracing::warn!(run_id, step = %kind, error = %e, "step could not start");
                return StepOutcome::Discarded;
            }
            Some(Ok(())) => {}
        }

        let endpoint = self.registry.endpoint(kind);
        tracing::debug!(run_id, step = %kind, endpoint, "dispatching step");
        let classified = match self.transport.post(endpoint, &body).await {
            Ok(response) => classify(response),
            Err(e) => Err(StepError::Network(e.to_string())),
        };

        self.write_back(state, kind, target, run_id, classified)
    }

    fn fail_unmet(&self, state: &SharedRunState, unmet: DependencyUnmet, run_id: u64) -> StepOutcome {
        let error = StepError::from(unmet);
        let message = error.to_string();
        tracing::warn!(run_id, step = %unmet.step, prerequisite = %unmet.prerequisite, "skipping call, prerequisite not satisfied");
        match state.mutate_if_current(run_id, |s| s.steps.set_error(unmet.step, message, now_ms())) {
            Some(_) => StepOutcome::Failed(error),
            None => StepOutcome::Discarded,
        }
    }

    fn write_back(
        &self,
        state: &SharedRunState,
        kind: StepKind,
        target: &str,
        run_id: u64,
        classified: Result<Value, StepError>,
    ) -> StepOutcome {
        let now = now_ms();
        let written = state.mutate_if_current(run_id, |s| {
            let transition = match &classified {
                Ok(result) => s.steps.set_success(kind, result.clone(), now),
                Err(e) => s.steps.set_error(kind, e.to_string(), now),
            };
            transition.map(|_| s.steps.get(kind).duration_ms.unwrap_or(0))
        });

        let duration_ms = match written {
            None => {
                tracing::warn!(run_id, step = %kind, "discarding late result of a run that is no longer current");
                return StepOutcome::Discarded;
            }
            Some(Err(e)) => {
                tracing::warn!(run_id, step = %kind, error = %e, "discarding step result");
                return StepOutcome::Discarded;
            }
            Some(Ok(duration_ms)) => duration_ms,
        };

        match classified {
            Ok(_) => {
                tracing::debug!(run_id, step = %kind, duration_ms, "step succeeded");
                self.telemetry.emit(TelemetryEvent::StepCompleted {
                    step_kind: kind,
                    target: target.to_string(),
                    duration_ms,
                });
                StepOutcome::Succeeded
            }
            Err(error) => {
                tracing::info!(run_id, step = %kind, duration_ms, error = %error, "step failed");
                self.telemetry.emit(TelemetryEvent::StepFailed {
                    step_kind: kind,
                    target: target.to_string(),
                    error: error.to_string(),
                    duration_ms,
                });
                StepOutcome::Failed(error)
            }
        }
    }
}

/// Decide whether a step response is a success.
pub fn classify(response: TransportResponse) -> Result<Value, StepError> {
    if !response.is_success() {
        let message = response
            .body
            .as_ref()
            .and_then(error_message)
            .unwrap_or_else(|| format!("HTTP {}", response.status));
        return Err(StepError::Http {
            status: response.status,
            message,
        });
    }

    let body = response
        .body
        .ok_or_else(|| StepError::Payload("invalid JSON response".to_string()))?;

    if let Some(message) = payload_failure(&body) {
        return Err(StepError::Payload(message));
    }
    Ok(body)
}

fn error_message(body: &Value) -> Option<String> {
    if let Some(message) = body.get("error").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(message) = body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        return Some(message.to_string());
    }
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn payload_failure(body: &Value) -> Option<String> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Some(error_message(body).unwrap_or_else(|| error.to_string()));
    }
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Some(error_message(body).unwrap_or_else(|| "analysis reported failure".to_string()));
    }
    match body.get("status").and_then(Value::as_str) {
        Some(status @ ("error" | "failed")) => {
            Some(error_message(body).unwrap_or_else(|| format!("analysis status: {}", status)))
        }
        _ => None,
    }
}
