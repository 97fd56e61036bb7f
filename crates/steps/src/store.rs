//! Step State Store
//!
//! In-memory map from step kind to its current status. Every registered kind
//! always has an entry. All operations are synchronous and perform no I/O;
//! timestamps are passed in by the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{RunStats, StepKind, StepState, StepStatus, SummaryBadge};

static PENDING_STATUS: StepStatus = StepStatus {
    state: StepState::Pending,
    start_time: None,
    end_time: None,
    duration_ms: None,
    result: None,
    error: None,
    progress: 0,
};

/// Attempted state change that the step lifecycle does not allow.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid transition for {kind}: {from} -> {to}")]
pub struct TransitionError {
    pub kind: StepKind,
    pub from: StepState,
    pub to: StepState,
}

/// Status of every registered step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<StepKind, StepStatus>",
    into = "BTreeMap<StepKind, StepStatus>"
)]
pub struct StepStore {
    entries: BTreeMap<StepKind, StepStatus>,
}

impl Default for StepStore {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BTreeMap<StepKind, StepStatus>> for StepStore {
    fn from(mut entries: BTreeMap<StepKind, StepStatus>) -> Self {
        for kind in StepKind::ALL {
            entries.entry(kind).or_insert_with(StepStatus::pending);
        }
        Self { entries }
    }
}

impl From<StepStore> for BTreeMap<StepKind, StepStatus> {
    fn from(store: StepStore) -> Self {
        store.entries
    }
}

impl StepStore {
    /// Create a store with every step pending.
    pub fn new() -> Self {
        Self::from(BTreeMap::new())
    }

    pub fn get(&self, kind: StepKind) -> &StepStatus {
        self.entries.get(&kind).unwrap_or(&PENDING_STATUS)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StepKind, &StepStatus)> {
        self.entries.iter().map(|(kind, status)| (*kind, status))
    }

    fn entry(&mut self, kind: StepKind) -> &mut StepStatus {
        self.entries.entry(kind).or_insert_with(StepStatus::pending)
    }

    /// `pending -> running`: stamps the start time and zeroes progress.
    pub fn set_running(&mut self, kind: StepKind, now_ms: i64) -> Result<(), TransitionError> {
        let status = self.entry(kind);
        if status.state != StepState::Pending {
            return Err(TransitionError {
                kind,
                from: status.state,
                to: StepState::Running,
            });
        }
        *status = StepStatus {
            state: StepState::Running,
            start_time: Some(now_ms),
            ..StepStatus::pending()
        };
        Ok(())
    }

    /// `running -> success`: stores the result and sets progress to 100.
    pub fn set_success(
        &mut self,
        kind: StepKind,
        result: Value,
        now_ms: i64,
    ) -> Result<(), TransitionError> {
        let status = self.entry(kind);
        if status.state != StepState::Running {
            return Err(TransitionError {
                kind,
                from: status.state,
                to: StepState::Success,
            });
        }
        status.state = StepState::Success;
        status.end_time = Some(now_ms);
        status.duration_ms = Some(elapsed_ms(status.start_time, now_ms));
        status.result = Some(result);
        status.error = None;
        status.progress = 100;
        Ok(())
    }

    /// `running -> error`, or `pending -> error` when the step never ran.
    pub fn set_error(
        &mut self,
        kind: StepKind,
        message: impl Into<String>,
        now_ms: i64,
    ) -> Result<(), TransitionError> {
        let status = self.entry(kind);
        if status.state.is_terminal() {
            return Err(TransitionError {
                kind,
                from: status.state,
                to: StepState::Error,
            });
        }
        status.state = StepState::Error;
        status.end_time = Some(now_ms);
        status.duration_ms = Some(elapsed_ms(status.start_time, now_ms));
        status.result = None;
        status.error = Some(message.into());
        status.progress = 0;
        Ok(())
    }

    /// Put every step back to `pending`.
    pub fn reset_all(&mut self) {
        for status in self.entries.values_mut() {
            *status = StepStatus::pending();
        }
    }

    /// Reset any step left `running` (e.g. by a reload mid-step) to `pending`.
    pub fn reset_running(&mut self) -> usize {
        let mut reset = 0;
        for status in self.entries.values_mut() {
            if status.state == StepState::Running {
                *status = StepStatus::pending();
                reset += 1;
            }
        }
        reset
    }

    /// True iff the step's output is final (`success` or `error`).
    pub fn is_actionable(&self, kind: StepKind) -> bool {
        self.get(kind).is_actionable()
    }

    pub fn summary_badge(&self, kind: StepKind) -> SummaryBadge {
        SummaryBadge::from(self.get(kind).state)
    }

    pub fn running_count(&self) -> usize {
        self.entries
            .values()
            .filter(|status| status.state == StepState::Running)
            .count()
    }

    pub fn count(&self, kinds: &[StepKind], state: StepState) -> usize {
        kinds
            .iter()
            .filter(|kind| self.get(**kind).state == state)
            .count()
    }

    /// Aggregate counters over exactly the `kinds` given.
    pub fn stats(&self, kinds: &[StepKind]) -> RunStats {
        let success = self.count(kinds, StepState::Success);
        let failed = self.count(kinds, StepState::Error);
        let total_duration_ms = kinds
            .iter()
            .map(|kind| self.get(*kind))
            .filter(|status| status.is_actionable())
            .filter_map(|status| status.duration_ms)
            .sum();

        RunStats {
            total: kinds.len(),
            completed: success + failed,
            success,
            failed,
            total_duration_ms,
        }
    }
}

fn elapsed_ms(start: Option<i64>, end: i64) -> u64 {
    start
        .map(|start| end.saturating_sub(start).max(0) as u64)
        .unwrap_or(0)
}
