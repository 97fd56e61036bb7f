//! SiteWatch Steps
//!
//! Step registry, step status models, and the in-memory state store used by
//! the analysis orchestrator. This crate performs no I/O and can be compiled
//! and tested independently:
//!
//! - `models` - Step data types (StepKind, StepState, StepStatus, SummaryBadge, RunStats)
//! - `registry` - Ordered step registry and request construction (StepRegistry, DependencyUnmet)
//! - `store` - Pure state transitions over every step's status (StepStore, TransitionError)
//!
//! Network execution, persistence and telemetry live in the main crate's
//! `services::orchestrator` and `storage` modules.

pub mod models;
pub mod registry;
pub mod store;

// Re-export core model types
pub use models::{RunStats, StepKind, StepState, StepStatus, SummaryBadge};

// Re-export registry types
pub use registry::{DependencyUnmet, StepRegistry, TargetField};

// Re-export store types
pub use store::{StepStore, TransitionError};
