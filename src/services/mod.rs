//! Services
//!
//! Business logic: the analysis orchestrator, telemetry delivery and the
//! session token sources it observes.

pub mod analytics;
pub mod orchestrator;
pub mod session;

pub use analytics::{TelemetryEvent, TelemetrySink, TelemetryTracker};
pub use orchestrator::{AnalysisOrchestrator, OrchestratorSettings, StartOutcome};
pub use session::{AuthTokenSource, KvAuthToken, StaticAuthToken};
