//! SiteWatch - Analysis Orchestrator
//!
//! Runs a fixed, ordered set of remote website analyses against one target
//! host at a time. It includes:
//! - The run controller, step executor and HTTP step transport
//! - Snapshot persistence with TTL and session-boundary wipe
//! - Buffered telemetry delivery
//! - Storage layer (SQLite key-value store, JSON config)

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use models::settings::{AppConfig, SettingsUpdate};
pub use models::snapshot::{RunSnapshot, RunSummary};
pub use services::orchestrator::{
    AnalysisOrchestrator, IgnoreReason, OrchestratorSettings, StartOutcome, StepTransport,
};
pub use sitewatch_steps::{RunStats, StepKind, StepRegistry, StepState, StepStatus, SummaryBadge};
pub use state::{AppState, StatePaths};
pub use utils::error::{AppError, AppResult};
