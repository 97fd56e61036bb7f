//! Session Token Sources
//!
//! The orchestrator does not manage authentication. It only observes whether
//! an auth token is present: the token decides whether the persisted
//! snapshot may be read or written, and is forwarded as a bearer token on
//! step requests.

use std::sync::{Arc, RwLock};

use crate::storage::kv::KeyValueStore;

/// Read-only view of the externally owned auth token.
pub trait AuthTokenSource: Send + Sync {
    fn token(&self) -> Option<String>;

    fn is_present(&self) -> bool {
        self.token().map(|t| !t.trim().is_empty()).unwrap_or(false)
    }
}

/// Token held in memory, settable and clearable by the owner.
#[derive(Debug, Default)]
pub struct StaticAuthToken {
    token: RwLock<Option<String>>,
}

impl StaticAuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        let mut guard = self.token.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(token.into());
    }

    /// Simulate a logout.
    pub fn clear(&self) {
        let mut guard = self.token.write().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }
}

impl AuthTokenSource for StaticAuthToken {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

/// Token read from a key in a `KeyValueStore`, the way a browser client keeps
/// it in local storage next to the snapshot slot.
pub struct KvAuthToken {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl KvAuthToken {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl AuthTokenSource for KvAuthToken {
    fn token(&self) -> Option<String> {
        match self.kv.get(&self.key) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "failed to read auth token");
                None
            }
        }
    }
}

impl std::fmt::Debug for KvAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvAuthToken").field("key", &self.key).finish()
    }
}
