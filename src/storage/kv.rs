//! Key-Value Store Abstraction
//!
//! A minimal string key-value interface standing in for browser-scoped
//! storage. Implementations: `MemoryKvStore` (tests, ephemeral sessions) and
//! the SQLite-backed `SqliteKvStore`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::utils::error::{AppError, AppResult};

/// Persisted string key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key is absent.
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    /// Insert or replace a value.
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    /// Remove a key. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> AppResult<()>;
}

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().map(|map| map.contains_key(key)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::storage("Memory store mutex poisoned"))
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> AppResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
