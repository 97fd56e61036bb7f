//! Storage Layer
//!
//! Key-value stores (SQLite and in-memory), the JSON config file, and run
//! snapshot persistence.

pub mod config;
pub mod database;
pub mod kv;
pub mod snapshot_store;

pub use config::*;
pub use database::*;
pub use kv::*;
pub use snapshot_store::*;
