//! Step Models
//!
//! Data structures for analysis step kinds and their per-step status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sitewatch_core::CoreError;

/// Analysis step kinds, declared in registry order.
///
/// The derived `Ord` follows declaration order, so a `BTreeMap<StepKind, _>`
/// iterates in the same order the registry runs steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Page speed / core web vitals
    Performance,
    /// Reachability and response time
    Uptime,
    /// TLS certificate validity
    Certificate,
    /// Name resolution records
    Dns,
    /// Sitemap discovery and validation
    Sitemap,
    /// AI analysis derived from the performance result
    AiInsight,
    /// Broken link check
    LinkCheck,
    /// Font and typography audit
    Typography,
}

impl StepKind {
    /// Every step kind in registry order.
    pub const ALL: [StepKind; 8] = [
        StepKind::Performance,
        StepKind::Uptime,
        StepKind::Certificate,
        StepKind::Dns,
        StepKind::Sitemap,
        StepKind::AiInsight,
        StepKind::LinkCheck,
        StepKind::Typography,
    ];

    /// Stable wire name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Performance => "performance",
            StepKind::Uptime => "uptime",
            StepKind::Certificate => "certificate",
            StepKind::Dns => "dns",
            StepKind::Sitemap => "sitemap",
            StepKind::AiInsight => "ai_insight",
            StepKind::LinkCheck => "link_check",
            StepKind::Typography => "typography",
        }
    }

    /// Get human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            StepKind::Performance => "Performance",
            StepKind::Uptime => "Uptime",
            StepKind::Certificate => "SSL Certificate",
            StepKind::Dns => "DNS",
            StepKind::Sitemap => "Sitemap",
            StepKind::AiInsight => "AI Insight",
            StepKind::LinkCheck => "Link Check",
            StepKind::Typography => "Typography",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        StepKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| CoreError::parse(format!("unknown step kind: {}", s)))
    }
}

/// Lifecycle state of a single step.
///
/// Valid transitions:
/// - `Pending` -> `Running`
/// - `Running` -> `Success`
/// - `Running` -> `Error`
/// - `Pending` -> `Error` (unmet prerequisite, no call made)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    #[default]
    Pending,
    Running,
    Success,
    Error,
}

impl StepState {
    /// Whether the step has produced its final output.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Success | StepState::Error)
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepState::Pending => write!(f, "pending"),
            StepState::Running => write!(f, "running"),
            StepState::Success => write!(f, "success"),
            StepState::Error => write!(f, "error"),
        }
    }
}

/// Fixed symbol mirroring a step's state, shown on summary cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryBadge {
    Pending,
    Running,
    Success,
    Error,
}

impl SummaryBadge {
    pub fn symbol(&self) -> &'static str {
        match self {
            SummaryBadge::Pending => "○",
            SummaryBadge::Running => "◐",
            SummaryBadge::Success => "✓",
            SummaryBadge::Error => "✗",
        }
    }
}

impl From<StepState> for SummaryBadge {
    fn from(state: StepState) -> Self {
        match state {
            StepState::Pending => SummaryBadge::Pending,
            StepState::Running => SummaryBadge::Running,
            StepState::Success => SummaryBadge::Success,
            StepState::Error => SummaryBadge::Error,
        }
    }
}

impl std::fmt::Display for SummaryBadge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Current status of one step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    /// Lifecycle state
    pub state: StepState,
    /// Epoch milliseconds when the step entered `running`
    pub start_time: Option<i64>,
    /// Epoch milliseconds when the step left `running`
    pub end_time: Option<i64>,
    /// Time spent running in milliseconds
    pub duration_ms: Option<u64>,
    /// Decoded response body, present only on success
    pub result: Option<Value>,
    /// Failure reason, present only on error
    pub error: Option<String>,
    /// Coarse progress indicator (0-100)
    pub progress: u8,
}

impl StepStatus {
    /// A fresh pending status.
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn is_actionable(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Aggregate counters over the steps of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Steps considered by the run
    pub total: usize,
    /// Steps that reached a terminal state
    pub completed: usize,
    /// Steps that succeeded
    pub success: usize,
    /// Steps that failed
    pub failed: usize,
    /// Sum of terminal step durations
    pub total_duration_ms: u64,
}
