//! Run Snapshot Persistence
//!
//! Mirrors the orchestrator snapshot into a single key-value slot as
//! `{ snapshot, timestamp }`. The slot is tied to the session: whenever the
//! auth token is observed absent the slot is deleted rather than read or
//! written. Entries older than the TTL are discarded on load.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::snapshot::RunSnapshot;
use crate::services::session::AuthTokenSource;
use crate::storage::kv::KeyValueStore;
use crate::utils::error::AppResult;

pub const DEFAULT_SNAPSHOT_KEY: &str = "site-analysis-state";
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(60 * 60);

/// Stored form of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub snapshot: RunSnapshot,
    /// Epoch milliseconds at save time
    pub timestamp: i64,
}

#[derive(Serialize)]
struct PersistedSnapshotRef<'a> {
    snapshot: &'a RunSnapshot,
    timestamp: i64,
}

/// Why `load` fell back to an empty snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Restored,
    Empty,
    SessionEnded,
    Expired,
    Corrupt,
}

pub struct SnapshotStore {
    kv: Arc<dyn KeyValueStore>,
    auth: Arc<dyn AuthTokenSource>,
    key: String,
    ttl: Duration,
}

impl SnapshotStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, auth: Arc<dyn AuthTokenSource>) -> Self {
        Self {
            kv,
            auth,
            key: DEFAULT_SNAPSHOT_KEY.to_string(),
            ttl: DEFAULT_SNAPSHOT_TTL,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Write the snapshot, or wipe the slot when no session is present.
    pub fn save(&self, snapshot: &RunSnapshot) -> AppResult<()> {
        self.save_at(snapshot, now_ms())
    }

    pub fn save_at(&self, snapshot: &RunSnapshot, now_ms: i64) -> AppResult<()> {
        if !self.has_session() {
            return self.kv.delete(&self.key);
        }
        let entry = PersistedSnapshotRef {
            snapshot,
            timestamp: now_ms,
        };
        let json = serde_json::to_string(&entry)?;
        self.kv.set(&self.key, &json)
    }

    /// Read back the persisted snapshot, normalized so it is never resumed.
    pub fn load(&self) -> RunSnapshot {
        self.load_at(now_ms()).0
    }

    pub fn load_at(&self, now_ms: i64) -> (RunSnapshot, LoadOutcome) {
        if !self.has_session() {
            self.discard("no auth token present");
            return (RunSnapshot::default(), LoadOutcome::SessionEnded);
        }

        let raw = match self.kv.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return (RunSnapshot::default(), LoadOutcome::Empty),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "failed to read persisted snapshot");
                return (RunSnapshot::default(), LoadOutcome::Empty);
            }
        };

        let entry: PersistedSnapshot = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "discarding undecodable snapshot");
                self.discard("undecodable entry");
                return (RunSnapshot::default(), LoadOutcome::Corrupt);
            }
        };

        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if now_ms.saturating_sub(entry.timestamp) > ttl_ms {
            self.discard("entry older than ttl");
            return (RunSnapshot::default(), LoadOutcome::Expired);
        }

        (entry.snapshot.into_restored(), LoadOutcome::Restored)
    }

    pub fn clear(&self) -> AppResult<()> {
        self.kv.delete(&self.key)
    }

    /// Raw stored entry, if any. Does not apply session or TTL checks.
    pub fn peek(&self) -> AppResult<Option<PersistedSnapshot>> {
        match self.kv.get(&self.key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn has_session(&self) -> bool {
        self.auth.is_present()
    }

    fn discard(&self, reason: &str) {
        tracing::debug!(key = %self.key, reason, "deleting persisted snapshot");
        if let Err(e) = self.kv.delete(&self.key) {
            tracing::warn!(key = %self.key, error = %e, "failed to delete persisted snapshot");
        }
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish()
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
