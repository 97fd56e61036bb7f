//! Analysis Orchestrator
//!
//! Runs the registered analysis steps for one target at a time: transport,
//! per-step executor, shared run state and the run controller.

mod controller;
mod executor;
mod run_state;
mod transport;

pub use controller::{
    AnalysisOrchestrator, IgnoreReason, OrchestratorBuilder, OrchestratorSettings, StartOutcome,
};
pub use executor::{classify, StepError, StepExecutor, StepOutcome};
pub use run_state::SharedRunState;
pub use transport::{HttpStepTransport, StepTransport, TransportError, TransportResponse};
