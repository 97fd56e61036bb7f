//! Run Snapshot Models
//!
//! The orchestrator's complete serializable state, and the summary returned
//! when a run finishes.

use serde::{Deserialize, Serialize};
use sitewatch_steps::{RunStats, StepKind, StepState, StepStore};

/// Complete state of the orchestrator at a point in time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    /// Normalized target host ("" when idle or restored)
    pub target: String,
    pub is_running: bool,
    /// Step currently executing
    pub active_step: Option<StepKind>,
    /// Position of `active_step` within `selected_steps`
    pub active_index: Option<usize>,
    /// Epoch milliseconds
    pub start_time: Option<i64>,
    /// Epoch milliseconds
    pub end_time: Option<i64>,
    /// Incremented on every accepted start, never reset
    pub run_sequence: u64,
    pub current_run_id: Option<u64>,
    pub last_completed_run_id: Option<u64>,
    /// Steps chosen for the latest run, in registry order
    #[serde(default)]
    pub selected_steps: Vec<StepKind>,
    /// Status of every registered step
    #[serde(default)]
    pub steps: StepStore,
}

impl RunSnapshot {
    /// Aggregate counters over the latest run's selection, or over every
    /// step when no run has recorded one (fresh or cleared snapshot).
    pub fn stats(&self) -> RunStats {
        if self.selected_steps.is_empty() {
            self.steps.stats(&StepKind::ALL)
        } else {
            self.steps.stats(&self.selected_steps)
        }
    }

    /// Summary of run `run_id` as it stands at `now`.
    pub fn summarize(&self, run_id: u64, now: i64, cancelled: bool) -> RunSummary {
        let success_count = self.steps.count(&self.selected_steps, StepState::Success);
        let failed_count = self.steps.count(&self.selected_steps, StepState::Error);
        RunSummary {
            run_id,
            target: self.target.clone(),
            steps: self.selected_steps.clone(),
            success_count,
            failed_count,
            skipped_count: self.selected_steps.len() - success_count - failed_count,
            total_duration_ms: self
                .start_time
                .map(|start| now.saturating_sub(start).max(0) as u64)
                .unwrap_or(0),
            cancelled,
        }
    }

    /// Close out a run that will never reach its own finalization: record it
    /// as completed and drop any step it left running.
    pub fn abandon_current(&mut self, now: i64) -> Option<RunSummary> {
        let run_id = self.current_run_id.take()?;
        let summary = self.summarize(run_id, now, true);
        self.last_completed_run_id = Some(run_id);
        self.is_running = false;
        self.active_step = None;
        self.active_index = None;
        self.end_time.get_or_insert(now);
        self.steps.reset_running();
        Some(summary)
    }

    /// Whether a running run started more than `threshold_ms` before `now_ms`.
    pub fn is_stale(&self, now_ms: i64, threshold_ms: i64) -> bool {
        match (self.is_running, self.start_time) {
            (true, Some(start)) => now_ms.saturating_sub(start) > threshold_ms,
            // A running snapshot without a start time cannot be aged; treat it as stale.
            (true, None) => true,
            (false, _) => false,
        }
    }

    /// Normalize a snapshot read back from storage so it is never resumed.
    pub fn into_restored(mut self) -> Self {
        self.is_running = false;
        self.active_step = None;
        self.active_index = None;
        self.current_run_id = None;
        self.target.clear();
        self.steps.reset_running();
        self
    }

    /// Empty snapshot that keeps the run-id bookkeeping.
    pub fn cleared(&self) -> Self {
        Self {
            run_sequence: self.run_sequence,
            last_completed_run_id: self.last_completed_run_id,
            ..Self::default()
        }
    }
}

/// Outcome of a run that reached its finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: u64,
    pub target: String,
    /// Steps selected for the run, in registry order
    pub steps: Vec<StepKind>,
    pub success_count: usize,
    pub failed_count: usize,
    /// Selected steps that never left `pending` (disabled or cancelled)
    pub skipped_count: usize,
    pub total_duration_ms: u64,
    /// Whether the loop ended because of a stop request
    pub cancelled: bool,
}
