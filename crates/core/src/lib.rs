//! SiteWatch Core
//!
//! Foundational error types and target normalization for the SiteWatch
//! workspace. This crate has no dependency on storage, HTTP or the async
//! runtime.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `target` - Target host normalization (`normalize_target`)

pub mod error;
pub mod target;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Target Normalization ───────────────────────────────────────────────
pub use target::{normalize_target, MIN_TARGET_LEN};
