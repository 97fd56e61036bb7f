//! Snapshot Persistence Integration Tests
//!
//! Orchestrators wired to a `SnapshotStore` over in-memory and SQLite
//! key-value stores:
//! - every committed mutation is mirrored to the slot
//! - a missing auth token wipes the slot
//! - entries older than the TTL are discarded
//! - restored snapshots are never resumed

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use sitewatch::services::session::{KvAuthToken, StaticAuthToken};
use sitewatch::storage::{KeyValueStore, MemoryKvStore, SnapshotStore, SqliteKvStore, DEFAULT_SNAPSHOT_KEY};
use sitewatch::{AnalysisOrchestrator, RunSnapshot, StepKind, StepState};

use crate::support::{now_ms, state_of, ScriptedTransport};

// ============================================================================
// Helpers
// ============================================================================

struct Fixture {
    kv: Arc<MemoryKvStore>,
    auth: Arc<StaticAuthToken>,
    store: Arc<SnapshotStore>,
    transport: Arc<ScriptedTransport>,
}

impl Fixture {
    fn new() -> Self {
        let kv = Arc::new(MemoryKvStore::new());
        let auth = Arc::new(StaticAuthToken::new("session-token"));
        let store = Arc::new(SnapshotStore::new(kv.clone(), auth.clone()));
        Self {
            kv,
            auth,
            store,
            transport: ScriptedTransport::new(),
        }
    }

    fn orchestrator(&self) -> AnalysisOrchestrator {
        AnalysisOrchestrator::builder(self.transport.clone())
            .persistence(self.store.clone())
            .build()
    }

    fn write_raw(&self, snapshot: &RunSnapshot, timestamp: i64) {
        let raw = json!({ "snapshot": snapshot, "timestamp": timestamp });
        self.kv.set(DEFAULT_SNAPSHOT_KEY, &raw.to_string()).unwrap();
    }
}

fn running_snapshot(run_sequence: u64) -> RunSnapshot {
    let mut snapshot = RunSnapshot {
        target: "example.com".to_string(),
        is_running: true,
        active_step: Some(StepKind::Uptime),
        active_index: Some(1),
        start_time: Some(now_ms() - 2_000),
        run_sequence,
        current_run_id: Some(run_sequence),
        last_completed_run_id: run_sequence.checked_sub(1),
        selected_steps: vec![StepKind::Performance, StepKind::Uptime],
        ..Default::default()
    };
    let started = now_ms() - 2_000;
    snapshot.steps.set_running(StepKind::Performance, started).unwrap();
    snapshot
        .steps
        .set_success(StepKind::Performance, json!({ "score": 64 }), started + 500)
        .unwrap();
    snapshot.steps.set_running(StepKind::Uptime, started + 600).unwrap();
    snapshot
}

// ============================================================================
// Session boundary and TTL
// ============================================================================

#[tokio::test]
async fn test_missing_token_wipes_persisted_run() {
    let fixture = Fixture::new();
    fixture.write_raw(&running_snapshot(3), now_ms());
    fixture.auth.clear();

    let orchestrator = fixture.orchestrator();
    assert_eq!(orchestrator.snapshot(), RunSnapshot::default());
    assert!(!fixture.kv.contains(DEFAULT_SNAPSHOT_KEY));
}

#[tokio::test]
async fn test_entry_older_than_ttl_is_discarded() {
    let fixture = Fixture::new();
    let sixty_one_minutes = 61 * 60 * 1000;
    fixture.write_raw(&running_snapshot(3), now_ms() - sixty_one_minutes);

    let orchestrator = fixture.orchestrator();
    assert_eq!(orchestrator.snapshot(), RunSnapshot::default());
    assert!(!fixture.kv.contains(DEFAULT_SNAPSHOT_KEY));
}

#[tokio::test]
async fn test_short_ttl_store() {
    let kv = Arc::new(MemoryKvStore::new());
    let auth = Arc::new(StaticAuthToken::new("t"));
    let store = SnapshotStore::new(kv.clone(), auth).with_ttl(Duration::from_millis(20));

    store.save(&running_snapshot(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(store.load(), RunSnapshot::default());
    assert!(kv.is_empty());
}

#[tokio::test]
async fn test_logout_mid_session_deletes_on_next_mutation() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();
    orchestrator.start_run("example.com", Some(&[StepKind::Dns])).await;
    assert!(fixture.kv.contains(DEFAULT_SNAPSHOT_KEY));

    fixture.auth.clear();
    orchestrator.start_run("example.com", Some(&[StepKind::Dns])).await;
    assert!(!fixture.kv.contains(DEFAULT_SNAPSHOT_KEY));
}

// ============================================================================
// Restore
// ============================================================================

#[tokio::test]
async fn test_restored_run_is_never_resumed() {
    let fixture = Fixture::new();
    fixture.write_raw(&running_snapshot(5), now_ms());

    let orchestrator = fixture.orchestrator();
    let snapshot = orchestrator.snapshot();
    assert!(!snapshot.is_running);
    assert!(snapshot.active_step.is_none());
    assert!(snapshot.active_index.is_none());
    assert!(snapshot.current_run_id.is_none());
    assert_eq!(snapshot.target, "");
    assert_eq!(state_of(&snapshot, StepKind::Performance), StepState::Success);
    assert_eq!(state_of(&snapshot, StepKind::Uptime), StepState::Pending);
    assert!(fixture.transport.calls().is_empty());

    // a restored snapshot accepts a new run immediately
    let next = orchestrator
        .start_run("example.com", Some(&[StepKind::Dns]))
        .await;
    assert_eq!(next.summary().unwrap().run_id, 6);
}

#[tokio::test]
async fn test_every_mutation_is_mirrored() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();
    let selected = [StepKind::Performance, StepKind::Uptime];
    orchestrator.start_run("example.com", Some(&selected)).await;

    let persisted = fixture.store.peek().unwrap().unwrap();
    assert_eq!(persisted.snapshot, orchestrator.snapshot());
    assert!(persisted.timestamp <= now_ms());
}

#[tokio::test]
async fn test_clear_results_deletes_slot() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();
    orchestrator.start_run("example.com", Some(&[StepKind::Dns])).await;
    assert!(fixture.kv.contains(DEFAULT_SNAPSHOT_KEY));

    orchestrator.clear_results();
    assert!(!fixture.kv.contains(DEFAULT_SNAPSHOT_KEY));
    assert_eq!(orchestrator.snapshot().run_sequence, 1);
}

#[tokio::test]
async fn test_sqlite_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("data.db");
    let transport = ScriptedTransport::new();

    let open = || {
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKvStore::open(&db_path).unwrap());
        let auth = Arc::new(KvAuthToken::new(kv.clone(), "token"));
        (kv.clone(), Arc::new(SnapshotStore::new(kv, auth)))
    };

    {
        let (kv, store) = open();
        kv.set("token", "jwt").unwrap();
        let orchestrator = AnalysisOrchestrator::builder(transport.clone())
            .persistence(store)
            .build();
        orchestrator
            .start_run("example.com", Some(&[StepKind::Dns, StepKind::Uptime]))
            .await;
        orchestrator.dispose();
    }

    let (kv, store) = open();
    let orchestrator = AnalysisOrchestrator::builder(transport.clone())
        .persistence(store)
        .build();
    let stats = orchestrator.get_stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.success, 2);
    assert_eq!(orchestrator.snapshot().last_completed_run_id, Some(1));

    kv.delete("token").unwrap();
    let (_, store) = open();
    assert_eq!(store.load(), RunSnapshot::default());
    assert!(kv.get(DEFAULT_SNAPSHOT_KEY).unwrap().is_none());
}
