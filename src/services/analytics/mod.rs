//! Telemetry
//!
//! Lifecycle events, in-process sinks, and buffered delivery to an analytics
//! collector.

mod collector;
mod events;
mod tracker;

pub use collector::*;
pub use events::*;
pub use tracker::*;
