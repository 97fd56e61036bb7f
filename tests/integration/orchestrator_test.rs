//! Run Controller Integration Tests
//!
//! Drives `AnalysisOrchestrator` against a scripted in-process transport:
//! - ordering and the single-running-step invariant
//! - per-step failure containment and stats
//! - dependency short-circuit
//! - cancellation at step boundaries, overlap rejection, stale override
//! - run id bookkeeping

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use sitewatch::services::analytics::{RecordingSink, TelemetryEvent};
use sitewatch::services::orchestrator::TransportResponse;
use sitewatch::{
    AnalysisOrchestrator, IgnoreReason, OrchestratorSettings, RunStats, StartOutcome, StepKind,
    StepState, SummaryBadge,
};

use crate::support::{endpoint, state_of, ScriptedTransport};

// ============================================================================
// Helpers
// ============================================================================

fn orchestrator(transport: &Arc<ScriptedTransport>) -> AnalysisOrchestrator {
    AnalysisOrchestrator::builder(transport.clone()).build()
}

fn orchestrator_with(
    transport: &Arc<ScriptedTransport>,
    settings: OrchestratorSettings,
    sink: Arc<RecordingSink>,
) -> AnalysisOrchestrator {
    AnalysisOrchestrator::builder(transport.clone())
        .settings(settings)
        .telemetry(sink)
        .build()
}

async fn wait_until_idle(orchestrator: &AnalysisOrchestrator) {
    let mut rx = orchestrator.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| !s.is_running))
        .await
        .expect("orchestrator did not become idle")
        .unwrap();
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_single_running_step_at_every_call() {
    let transport = ScriptedTransport::new();
    let orchestrator = orchestrator(&transport);
    transport.observe(orchestrator.subscribe());

    orchestrator.start_run("example.com", None).await;

    let calls = transport.calls();
    // ai_insight consumes performance, which succeeds here, so every step calls out
    assert_eq!(calls.len(), StepKind::ALL.len());
    for (call, kind) in calls.iter().zip(StepKind::ALL) {
        assert!(call.is_running);
        assert_eq!(call.running_steps, 1, "call to {}", call.endpoint);
        assert_eq!(call.active_step, Some(kind));
    }
    assert_eq!(orchestrator.snapshot().steps.running_count(), 0);
}

#[tokio::test]
async fn test_selection_runs_in_registry_order() {
    let transport = ScriptedTransport::new();
    let orchestrator = orchestrator(&transport);

    let selected = [StepKind::Typography, StepKind::Dns, StepKind::Performance, StepKind::Dns];
    let outcome = orchestrator.start_run("example.com", Some(&selected)).await;

    assert_eq!(
        transport.endpoints(),
        vec![
            endpoint(StepKind::Performance),
            endpoint(StepKind::Dns),
            endpoint(StepKind::Typography)
        ]
    );
    let summary = outcome.summary().unwrap();
    assert_eq!(
        summary.steps,
        vec![StepKind::Performance, StepKind::Dns, StepKind::Typography]
    );

    let snapshot = orchestrator.snapshot();
    assert_eq!(state_of(&snapshot, StepKind::Uptime), StepState::Pending);
    assert_eq!(snapshot.steps.iter().count(), StepKind::ALL.len());
}

#[tokio::test]
async fn test_target_is_normalized_before_any_step() {
    let transport = ScriptedTransport::new();
    let orchestrator = orchestrator(&transport);

    let selected = [StepKind::Performance, StepKind::Certificate];
    orchestrator
        .start_run("https://www.Example.com/page?x=1", Some(&selected))
        .await;

    let calls = transport.calls();
    assert_eq!(calls[0].body, json!({ "target": "example.com" }));
    assert_eq!(calls[1].body, json!({ "domain": "example.com" }));
    assert_eq!(orchestrator.snapshot().target, "example.com");
}

// ============================================================================
// Failure containment
// ============================================================================

#[tokio::test]
async fn test_partial_failure_accounting() {
    let transport = ScriptedTransport::new();
    transport.reply(
        StepKind::Performance,
        TransportResponse::json(503, json!({ "error": "lighthouse unavailable" })),
    );
    let orchestrator = orchestrator(&transport);

    let selected = [StepKind::Performance, StepKind::Uptime];
    orchestrator.start_run("example.com", Some(&selected)).await;

    let stats = orchestrator.get_stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 1);

    let snapshot = orchestrator.snapshot();
    let performance = snapshot.steps.get(StepKind::Performance);
    assert_eq!(performance.error.as_deref(), Some("lighthouse unavailable"));
    assert_eq!(performance.progress, 0);
    assert_eq!(orchestrator.summary_badge(StepKind::Performance), SummaryBadge::Error);
    assert_eq!(orchestrator.summary_badge(StepKind::Uptime), SummaryBadge::Success);
}

#[tokio::test]
async fn test_every_error_kind_is_contained() {
    let transport = ScriptedTransport::new();
    transport.fail(StepKind::Uptime, "connection reset");
    transport.reply(StepKind::Certificate, TransportResponse::undecodable(502));
    transport.reply(
        StepKind::Dns,
        TransportResponse::json(200, json!({ "success": false, "message": "NXDOMAIN" })),
    );
    transport.reply(StepKind::Sitemap, TransportResponse::undecodable(200));
    let orchestrator = orchestrator(&transport);

    let summary = orchestrator
        .start_run("example.com", None)
        .await
        .summary()
        .cloned()
        .unwrap();

    let snapshot = orchestrator.snapshot();
    let error_of = |kind| snapshot.steps.get(kind).error.clone().unwrap();
    assert_eq!(error_of(StepKind::Uptime), "network error: connection reset");
    assert_eq!(error_of(StepKind::Certificate), "HTTP 502");
    assert_eq!(error_of(StepKind::Dns), "NXDOMAIN");
    assert_eq!(error_of(StepKind::Sitemap), "invalid JSON response");

    assert_eq!(summary.failed_count, 4);
    assert_eq!(summary.success_count, StepKind::ALL.len() - 4);
    assert!(!snapshot.is_running);
}

#[tokio::test]
async fn test_dependency_short_circuit() {
    let transport = ScriptedTransport::new();
    transport.reply(
        StepKind::Performance,
        TransportResponse::json(500, json!({ "message": "timeout" })),
    );
    let orchestrator = orchestrator(&transport);
    let mut rx = orchestrator.subscribe();

    let selected = [StepKind::Performance, StepKind::AiInsight];
    let watcher = tokio::spawn(async move {
        let mut ai_states = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().steps.get(StepKind::AiInsight).state;
            if ai_states.last() != Some(&state) {
                ai_states.push(state);
            }
        }
        ai_states
    });

    orchestrator.start_run("example.com", Some(&selected)).await;

    assert!(!transport
        .endpoints()
        .contains(&endpoint(StepKind::AiInsight).to_string()));
    let snapshot = orchestrator.snapshot();
    let insight = snapshot.steps.get(StepKind::AiInsight);
    assert_eq!(insight.state, StepState::Error);
    assert!(insight.start_time.is_none());
    assert!(insight
        .error
        .as_deref()
        .unwrap()
        .starts_with("prerequisite not satisfied"));

    orchestrator.dispose();
    drop(orchestrator);
    let ai_states = tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .unwrap()
        .unwrap();
    assert!(!ai_states.contains(&StepState::Running));
}

#[tokio::test]
async fn test_dependent_step_receives_prior_result() {
    let transport = ScriptedTransport::new();
    transport.reply(
        StepKind::Performance,
        TransportResponse::json(200, json!({ "score": 73 })),
    );
    let orchestrator = orchestrator(&transport);

    let selected = [StepKind::AiInsight, StepKind::Performance];
    orchestrator.start_run("example.com", Some(&selected)).await;

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].endpoint, endpoint(StepKind::AiInsight));
    assert_eq!(calls[1].body["priorResult"], json!({ "score": 73 }));
    assert!(calls[1].body["prompt"].as_str().unwrap().contains("example.com"));
    assert!(orchestrator.is_step_actionable(StepKind::AiInsight));
}

// ============================================================================
// Queries and telemetry
// ============================================================================

#[tokio::test]
async fn test_empty_selection_runs_every_step() {
    let transport = ScriptedTransport::new();
    let orchestrator = orchestrator(&transport);

    let summary = orchestrator
        .start_run("example.com", Some(&[]))
        .await
        .summary()
        .cloned()
        .unwrap();
    assert_eq!(summary.steps, StepKind::ALL.to_vec());
    assert_eq!(transport.calls().len(), StepKind::ALL.len());

    let stats = orchestrator.get_stats();
    assert_eq!(stats.total, summary.steps.len());
    assert_eq!(stats.success, summary.success_count);
}

#[tokio::test]
async fn test_stats_total_matches_recorded_selection() {
    let transport = ScriptedTransport::new();
    let orchestrator = orchestrator(&transport);
    orchestrator
        .start_run("example.com", Some(&[StepKind::Dns, StepKind::Uptime]))
        .await;

    let stats = orchestrator.get_stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 2);
}

#[tokio::test]
async fn test_get_stats_is_idempotent() {
    let transport = ScriptedTransport::new();
    transport.reply(StepKind::Dns, TransportResponse::json(404, json!({})));
    let orchestrator = orchestrator(&transport);
    orchestrator.start_run("example.com", None).await;

    let first: RunStats = orchestrator.get_stats();
    let second = orchestrator.get_stats();
    assert_eq!(first, second);
    assert_eq!(first.total, StepKind::ALL.len());
    assert_eq!(first.failed, 1);
}

#[tokio::test]
async fn test_lifecycle_telemetry() {
    let transport = ScriptedTransport::new();
    transport.reply(StepKind::Uptime, TransportResponse::json(500, json!({})));
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = orchestrator_with(&transport, OrchestratorSettings::default(), sink.clone());

    let selected = [StepKind::Performance, StepKind::Uptime];
    orchestrator.start_run("example.com", Some(&selected)).await;

    assert_eq!(
        sink.names(),
        vec!["run_started", "step_completed", "step_failed", "run_completed"]
    );
    let events = sink.events();
    assert_eq!(
        events[0],
        TelemetryEvent::RunStarted {
            target: "example.com".to_string(),
            steps: selected.to_vec(),
            step_count: 2,
        }
    );
    match &events[3] {
        TelemetryEvent::RunCompleted {
            success_count,
            failed_count,
            steps,
            ..
        } => {
            assert_eq!((*success_count, *failed_count), (1, 1));
            assert_eq!(steps, &selected.to_vec());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

// ============================================================================
// Cancellation and overlap
// ============================================================================

#[tokio::test]
async fn test_stop_prevents_next_step() {
    let transport = ScriptedTransport::new();
    let gate = transport.gate(StepKind::Uptime);
    let orchestrator = orchestrator(&transport);

    let runner = orchestrator.clone();
    let run = tokio::spawn(async move {
        runner
            .start_run("example.com", Some(&[StepKind::Uptime, StepKind::Certificate]))
            .await
    });

    gate.entered().await;
    assert!(orchestrator.stop_analysis());
    let stopped = orchestrator.snapshot();
    assert!(!stopped.is_running);
    assert!(stopped.end_time.is_some());

    gate.release();
    let outcome = run.await.unwrap();
    let summary = outcome.summary().unwrap();
    assert!(summary.cancelled);

    let snapshot = orchestrator.snapshot();
    // the in-flight step still lands
    assert_eq!(state_of(&snapshot, StepKind::Uptime), StepState::Success);
    assert_eq!(state_of(&snapshot, StepKind::Certificate), StepState::Pending);
    assert_eq!(transport.endpoints(), vec![endpoint(StepKind::Uptime)]);
    assert_eq!(snapshot.last_completed_run_id, Some(1));
    assert!(!orchestrator.stop_analysis());
}

#[tokio::test]
async fn test_overlapping_start_is_ignored() {
    let transport = ScriptedTransport::new();
    let gate = transport.gate(StepKind::Performance);
    let orchestrator = orchestrator(&transport);

    let runner = orchestrator.clone();
    let first = tokio::spawn(async move { runner.start_run("example.com", None).await });
    gate.entered().await;

    let second = orchestrator.start_run("other.org", None).await;
    assert_eq!(second, StartOutcome::Ignored(IgnoreReason::AlreadyRunning));
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.run_sequence, 1);
    assert_eq!(snapshot.target, "example.com");

    gate.release();
    let first = first.await.unwrap();
    assert_eq!(first.summary().unwrap().target, "example.com");
}

#[tokio::test]
async fn test_stale_run_is_overridden() {
    let transport = ScriptedTransport::new();
    let gate = transport.gate(StepKind::Uptime);
    let settings = OrchestratorSettings {
        stale_threshold: Duration::from_millis(50),
        ..Default::default()
    };
    let orchestrator = orchestrator_with(&transport, settings, Arc::new(RecordingSink::new()));

    let runner = orchestrator.clone();
    let stale = tokio::spawn(async move {
        runner
            .start_run("example.com", Some(&[StepKind::Uptime]))
            .await
    });
    gate.entered().await;
    tokio::time::sleep(Duration::from_millis(120)).await;

    let fresh = orchestrator
        .start_run("other.org", Some(&[StepKind::Dns]))
        .await;
    assert_eq!(fresh.summary().unwrap().run_id, 2);
    assert_eq!(stale.await.unwrap(), StartOutcome::Superseded);

    gate.release();
    tokio::task::yield_now().await;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.target, "other.org");
    assert_eq!(snapshot.last_completed_run_id, Some(2));
    assert_eq!(state_of(&snapshot, StepKind::Uptime), StepState::Pending);
    assert_eq!(state_of(&snapshot, StepKind::Dns), StepState::Success);
}

#[tokio::test]
async fn test_late_result_after_restart_is_discarded() {
    let transport = ScriptedTransport::new();
    let gate = transport.gate(StepKind::Uptime);
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = orchestrator_with(&transport, OrchestratorSettings::default(), sink.clone());

    let runner = orchestrator.clone();
    let stopped = tokio::spawn(async move {
        runner
            .start_run("example.com", Some(&[StepKind::Uptime, StepKind::Dns]))
            .await
    });
    gate.entered().await;
    orchestrator.stop_analysis();

    let next = orchestrator
        .start_run("example.com", Some(&[StepKind::Sitemap]))
        .await;
    assert_eq!(next.summary().unwrap().run_id, 2);
    assert_eq!(stopped.await.unwrap(), StartOutcome::Superseded);
    gate.release();
    tokio::task::yield_now().await;

    let snapshot = orchestrator.snapshot();
    assert_eq!(state_of(&snapshot, StepKind::Uptime), StepState::Pending);
    assert_eq!(state_of(&snapshot, StepKind::Dns), StepState::Pending);
    assert_eq!(state_of(&snapshot, StepKind::Sitemap), StepState::Success);
    assert_eq!(snapshot.selected_steps, vec![StepKind::Sitemap]);
    assert_eq!(snapshot.last_completed_run_id, Some(2));

    // the stopped run is still reported as completed, once, before run 2 starts
    assert_eq!(
        sink.names(),
        vec!["run_started", "run_completed", "run_started", "step_completed", "run_completed"]
    );
    match &sink.events()[1] {
        TelemetryEvent::RunCompleted {
            steps,
            success_count,
            failed_count,
            ..
        } => {
            assert_eq!(steps, &vec![StepKind::Uptime, StepKind::Dns]);
            assert_eq!((*success_count, *failed_count), (0, 0));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_stopped_run_is_recorded_before_next_start() {
    let transport = ScriptedTransport::new();
    let first_gate = transport.gate(StepKind::Uptime);
    let second_gate = transport.gate(StepKind::Dns);
    let orchestrator = orchestrator(&transport);

    let runner = orchestrator.clone();
    let stopped = tokio::spawn(async move {
        runner
            .start_run("example.com", Some(&[StepKind::Uptime]))
            .await
    });
    first_gate.entered().await;
    orchestrator.stop_analysis();

    let runner = orchestrator.clone();
    let next = tokio::spawn(async move {
        runner
            .start_run("example.com", Some(&[StepKind::Dns]))
            .await
    });
    second_gate.entered().await;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.current_run_id, Some(2));
    assert_eq!(snapshot.last_completed_run_id, Some(1));
    assert_eq!(state_of(&snapshot, StepKind::Uptime), StepState::Pending);

    second_gate.release();
    assert_eq!(next.await.unwrap().summary().unwrap().run_id, 2);
    assert_eq!(stopped.await.unwrap(), StartOutcome::Superseded);
    first_gate.release();
}

// ============================================================================
// Bookkeeping
// ============================================================================

#[tokio::test]
async fn test_run_ids_strictly_increase() {
    let transport = ScriptedTransport::new();
    let orchestrator = orchestrator(&transport);
    let mut rx = orchestrator.subscribe();

    let first = orchestrator.start_run("example.com", Some(&[StepKind::Dns])).await;
    let second = orchestrator.start_run("example.com", Some(&[StepKind::Dns])).await;

    let first_id = first.summary().unwrap().run_id;
    let second_id = second.summary().unwrap().run_id;
    assert!(second_id > first_id);

    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.last_completed_run_id, Some(second_id));
    assert_eq!(snapshot.run_sequence, second_id);
    assert!(snapshot.current_run_id.is_none());
}

#[tokio::test]
async fn test_clear_results_keeps_run_bookkeeping() {
    let transport = ScriptedTransport::new();
    let orchestrator = orchestrator(&transport);
    orchestrator.start_run("example.com", None).await;
    orchestrator.start_run("example.com", None).await;

    orchestrator.clear_results();
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.target, "");
    assert_eq!(snapshot.run_sequence, 2);
    assert_eq!(snapshot.last_completed_run_id, Some(2));
    assert!(StepKind::ALL
        .iter()
        .all(|kind| state_of(&snapshot, *kind) == StepState::Pending));

    let next = orchestrator.start_run("example.com", Some(&[StepKind::Dns])).await;
    assert_eq!(next.summary().unwrap().run_id, 3);
}

#[tokio::test]
async fn test_clear_during_run_discards_its_results() {
    let transport = ScriptedTransport::new();
    let gate = transport.gate(StepKind::Performance);
    let orchestrator = orchestrator(&transport);

    let runner = orchestrator.clone();
    let run = tokio::spawn(async move { runner.start_run("example.com", None).await });
    gate.entered().await;

    orchestrator.clear_results();
    gate.release();
    assert_eq!(run.await.unwrap(), StartOutcome::Superseded);

    wait_until_idle(&orchestrator).await;
    let snapshot = orchestrator.snapshot();
    assert_eq!(state_of(&snapshot, StepKind::Performance), StepState::Pending);
    assert_eq!(snapshot.last_completed_run_id, None);
    assert_eq!(transport.endpoints(), vec![endpoint(StepKind::Performance)]);
}

#[tokio::test]
async fn test_dispose_mid_call_leaves_no_running_step() {
    let transport = ScriptedTransport::new();
    let gate = transport.gate(StepKind::Uptime);
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = orchestrator_with(&transport, OrchestratorSettings::default(), sink.clone());

    let runner = orchestrator.clone();
    let run = tokio::spawn(async move {
        runner
            .start_run("example.com", Some(&[StepKind::Uptime, StepKind::Dns]))
            .await
    });
    gate.entered().await;

    orchestrator.dispose();
    assert_eq!(run.await.unwrap(), StartOutcome::Superseded);

    let snapshot = orchestrator.snapshot();
    assert!(!snapshot.is_running);
    assert!(snapshot.current_run_id.is_none());
    assert!(snapshot.active_step.is_none());
    assert_eq!(snapshot.steps.running_count(), 0);
    assert_eq!(snapshot.last_completed_run_id, Some(1));
    assert_eq!(sink.names(), vec!["run_started", "run_completed"]);
}
