//! Shared Run State
//!
//! The one mutable `RunSnapshot` of an orchestrator. Every committed
//! mutation is mirrored to the snapshot store and published to watchers
//! while the lock is held, so persisted and observed snapshots follow the
//! mutation order. The lock is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::models::snapshot::RunSnapshot;
use crate::storage::snapshot_store::SnapshotStore;

pub struct SharedRunState {
    snapshot: Mutex<RunSnapshot>,
    persistence: Option<Arc<SnapshotStore>>,
    notifier: watch::Sender<RunSnapshot>,
}

impl SharedRunState {
    pub fn new(initial: RunSnapshot, persistence: Option<Arc<SnapshotStore>>) -> Self {
        let (notifier, _) = watch::channel(initial.clone());
        Self {
            snapshot: Mutex::new(initial),
            persistence,
            notifier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunSnapshot> {
        self.snapshot.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn read<R>(&self, f: impl FnOnce(&RunSnapshot) -> R) -> R {
        f(&self.lock())
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.notifier.subscribe()
    }

    /// Apply `f` and commit.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut RunSnapshot) -> R) -> R {
        let mut guard = self.lock();
        let out = f(&mut guard);
        self.commit(&guard);
        out
    }

    /// Apply `f`; commit only when it returns `Ok`.
    ///
    /// `f` must leave the snapshot untouched when it returns `Err`.
    pub fn try_mutate<R, E>(&self, f: impl FnOnce(&mut RunSnapshot) -> Result<R, E>) -> Result<R, E> {
        let mut guard = self.lock();
        let out = f(&mut guard)?;
        self.commit(&guard);
        Ok(out)
    }

    /// Apply `f` only while `run_id` is still the current run.
    ///
    /// Returns `None`, without touching the snapshot, for a write-back from
    /// a run that has been finalized, superseded, or cleared.
    pub fn mutate_if_current<R>(
        &self,
        run_id: u64,
        f: impl FnOnce(&mut RunSnapshot) -> R,
    ) -> Option<R> {
        let mut guard = self.lock();
        if guard.current_run_id != Some(run_id) {
            return None;
        }
        let out = f(&mut guard);
        self.commit(&guard);
        Some(out)
    }

    /// Whether `run_id` is current and has not been stopped.
    pub fn is_active(&self, run_id: u64) -> bool {
        let guard = self.lock();
        guard.is_running && guard.current_run_id == Some(run_id)
    }

    /// Replace the snapshot and publish it without persisting it.
    pub fn replace_unsaved(&self, next: RunSnapshot) {
        let mut guard = self.lock();
        *guard = next;
        self.notifier.send_replace(guard.clone());
    }

    fn commit(&self, snapshot: &RunSnapshot) {
        if let Some(store) = &self.persistence {
            if let Err(e) = store.save(snapshot) {
                tracing::warn!(error = %e, "failed to persist run snapshot");
            }
        }
        self.notifier.send_replace(snapshot.clone());
    }
}

impl std::fmt::Debug for SharedRunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRunState")
            .field("snapshot", &*self.lock())
            .field("persisted", &self.persistence.is_some())
            .finish()
    }
}
