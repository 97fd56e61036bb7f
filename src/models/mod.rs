//! Data Models
//!
//! Contains all data structures used throughout the application.

pub mod settings;
pub mod snapshot;

pub use settings::*;
pub use snapshot::*;
