//! Run Controller
//!
//! `AnalysisOrchestrator` accepts or rejects run requests and hands accepted
//! runs to a single worker task. The worker drives one run at a time; when a
//! newer run is queued while an older one is still awaiting its last call
//! (it was stopped, or overridden as stale), the older run's future is
//! dropped and its late result is never written. The newer start closes the
//! older run out first, so every started run is reported as completed once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sitewatch_core::normalize_target;
use sitewatch_steps::{RunStats, StepKind, StepRegistry, SummaryBadge};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::executor::{StepExecutor, StepOutcome};
use super::run_state::SharedRunState;
use super::transport::StepTransport;
use crate::models::settings::AppConfig;
use crate::models::snapshot::{RunSnapshot, RunSummary};
use crate::services::analytics::{NoopSink, TelemetryEvent, TelemetrySink};
use crate::storage::snapshot_store::{now_ms, SnapshotStore};

/// Controller tuning, usually derived from `AppConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Age after which a running run may be force-reset by a new start
    pub stale_threshold: Duration,
    /// Steps skipped by every run regardless of selection
    pub disabled_steps: Vec<StepKind>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            stale_threshold: Duration::from_secs(5 * 60),
            disabled_steps: Vec::new(),
        }
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            stale_threshold: Duration::from_secs(config.stale_run_secs),
            disabled_steps: config.disabled_steps.clone(),
        }
    }
}

/// Why a `start_run` call created no run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    InvalidTarget,
    AlreadyRunning,
    Disposed,
}

/// Result of a `start_run` call.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// The run reached finalization.
    Completed(RunSummary),
    /// No run was created.
    Ignored(IgnoreReason),
    /// The run was replaced by a newer run before it finalized.
    Superseded,
}

impl StartOutcome {
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            StartOutcome::Completed(summary) => Some(summary),
            _ => None,
        }
    }
}

struct RunJob {
    run_id: u64,
    target: String,
    steps: Vec<StepKind>,
    token: CancellationToken,
    reply: oneshot::Sender<Option<RunSummary>>,
}

/// Everything one run needs; shared with the worker task.
struct RunEngine {
    registry: Arc<StepRegistry>,
    state: Arc<SharedRunState>,
    executor: StepExecutor,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RunEngine {
    async fn run(&self, run_id: u64, target: &str, steps: &[StepKind], token: &CancellationToken) -> Option<RunSummary> {
        for (index, &kind) in steps.iter().enumerate() {
            if token.is_cancelled() || !self.state.is_active(run_id) {
                tracing::info!(run_id, next_step = %kind, "run stopped before step");
                break;
            }
            if self.registry.is_disabled(kind) {
                tracing::debug!(run_id, step = %kind, "step disabled, skipping");
                continue;
            }

            let marked = self.state.mutate_if_current(run_id, |s| {
                s.active_step = Some(kind);
                s.active_index = Some(index);
            });
            if marked.is_none() {
                break;
            }

            let outcome = self.executor.execute(&self.state, kind, target, run_id).await;
            if outcome == StepOutcome::Discarded {
                break;
            }

            self.state.mutate_if_current(run_id, |s| {
                s.active_step = None;
                s.active_index = None;
            });
        }

        self.finalize(run_id, token.is_cancelled())
    }

    fn finalize(&self, run_id: u64, cancelled: bool) -> Option<RunSummary> {
        let summary = self.state.mutate_if_current(run_id, |s| {
            let now = now_ms();
            let summary = s.summarize(run_id, now, cancelled);
            s.is_running = false;
            s.active_step = None;
            s.active_index = None;
            s.end_time = Some(now);
            s.last_completed_run_id = s.current_run_id;
            s.current_run_id = None;
            summary
        })?;
        self.report_completed(&summary);
        Some(summary)
    }

    fn report_completed(&self, summary: &RunSummary) {
        tracing::info!(
            run_id = summary.run_id,
            host = %summary.target,
            success = summary.success_count,
            failed = summary.failed_count,
            skipped = summary.skipped_count,
            cancelled = summary.cancelled,
            "run finished"
        );
        self.telemetry.emit(TelemetryEvent::RunCompleted {
            target: summary.target.clone(),
            steps: summary.steps.clone(),
            success_count: summary.success_count,
            failed_count: summary.failed_count,
            total_duration_ms: summary.total_duration_ms,
        });
    }
}

async fn worker_loop(engine: Arc<RunEngine>, mut jobs: mpsc::UnboundedReceiver<RunJob>) {
    let mut next = jobs.recv().await;
    while let Some(job) = next.take() {
        let run = engine.run(job.run_id, &job.target, &job.steps, &job.token);
        tokio::pin!(run);

        tokio::select! {
            summary = &mut run => {
                let _ = job.reply.send(summary);
                next = jobs.recv().await;
            }
            newer = jobs.recv() => {
                tracing::warn!(run_id = job.run_id, "run superseded while awaiting a step");
                job.token.cancel();
                next = newer;
            }
        }
    }
    tracing::debug!("orchestrator worker stopped");
}

struct Inner {
    engine: Arc<RunEngine>,
    settings: OrchestratorSettings,
    persistence: Option<Arc<SnapshotStore>>,
    jobs: mpsc::UnboundedSender<RunJob>,
    cancel: Mutex<Option<CancellationToken>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

/// Drives analysis runs for one target at a time.
///
/// Cheap to clone; all clones share the same state and worker.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    inner: Arc<Inner>,
}

impl AnalysisOrchestrator {
    pub fn builder(transport: Arc<dyn StepTransport>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(transport)
    }

    /// Begin a run and wait for it to finish.
    ///
    /// Invalid targets and overlapping starts are logged and ignored rather
    /// than treated as errors.
    pub async fn start_run(&self, target_input: &str, selected: Option<&[StepKind]>) -> StartOutcome {
        let target = match normalize_target(target_input) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(input = target_input, error = %e, "ignoring run request with invalid target");
                return StartOutcome::Ignored(IgnoreReason::InvalidTarget);
            }
        };
        if self.is_disposed() {
            return StartOutcome::Ignored(IgnoreReason::Disposed);
        }

        let engine = &self.inner.engine;
        let steps = engine.registry.plan(selected);
        let stale_ms = i64::try_from(self.inner.settings.stale_threshold.as_millis()).unwrap_or(i64::MAX);

        let accepted = engine.state.try_mutate(|s| {
            let now = now_ms();
            if s.is_running {
                if !s.is_stale(now, stale_ms) {
                    return Err(IgnoreReason::AlreadyRunning);
                }
                tracing::warn!(
                    stale_run_id = ?s.current_run_id,
                    started_at = ?s.start_time,
                    "overriding stale run"
                );
            }
            // A stopped run still awaiting its last call, or a stale one,
            // never reaches finalize once the new run id is current.
            let abandoned = s.abandon_current(now);

            s.run_sequence += 1;
            s.current_run_id = Some(s.run_sequence);
            s.is_running = true;
            s.start_time = Some(now);
            s.end_time = None;
            s.active_step = None;
            s.active_index = None;
            s.target = target.clone();
            s.selected_steps = steps.clone();
            s.steps.reset_all();
            Ok((s.run_sequence, abandoned))
        });

        let run_id = match accepted {
            Ok((run_id, abandoned)) => {
                if let Some(previous) = abandoned {
                    engine.report_completed(&previous);
                }
                run_id
            }
            Err(reason) => {
                tracing::warn!(host = %target, "ignoring run request, a run is already active");
                return StartOutcome::Ignored(reason);
            }
        };

        tracing::info!(run_id, host = %target, steps = steps.len(), "run started");
        engine.telemetry.emit(TelemetryEvent::RunStarted {
            target: target.clone(),
            steps: steps.clone(),
            step_count: steps.len(),
        });

        let token = CancellationToken::new();
        {
            let mut slot = self.inner.cancel.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(previous) = slot.replace(token.clone()) {
                previous.cancel();
            }
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = RunJob {
            run_id,
            target,
            steps,
            token,
            reply: reply_tx,
        };
        if self.inner.jobs.send(job).is_err() {
            engine.finalize(run_id, true);
            return StartOutcome::Ignored(IgnoreReason::Disposed);
        }

        match reply_rx.await {
            Ok(Some(summary)) => StartOutcome::Completed(summary),
            Ok(None) | Err(_) => StartOutcome::Superseded,
        }
    }

    /// Request a cooperative stop. No new step starts; an in-flight call is
    /// left to resolve. Returns `false` when nothing was running.
    pub fn stop_analysis(&self) -> bool {
        let stopped = self.inner.engine.state.try_mutate(|s| {
            if !s.is_running {
                return Err(());
            }
            s.is_running = false;
            s.end_time = Some(now_ms());
            Ok(s.current_run_id)
        });

        match stopped {
            Ok(run_id) => {
                self.cancel_current();
                tracing::info!(run_id = ?run_id, "stop requested");
                true
            }
            Err(()) => false,
        }
    }

    /// Reset to an empty snapshot and delete the persisted slot. Run-id
    /// bookkeeping survives.
    pub fn clear_results(&self) {
        self.cancel_current();
        let state = &self.inner.engine.state;
        let cleared = state.read(RunSnapshot::cleared);
        state.replace_unsaved(cleared);
        if let Some(store) = &self.inner.persistence {
            if let Err(e) = store.clear() {
                tracing::warn!(error = %e, "failed to delete persisted snapshot");
            }
        }
    }

    pub fn get_stats(&self) -> RunStats {
        self.inner.engine.state.read(RunSnapshot::stats)
    }

    pub fn is_step_actionable(&self, kind: StepKind) -> bool {
        self.inner.engine.state.read(|s| s.steps.is_actionable(kind))
    }

    pub fn summary_badge(&self, kind: StepKind) -> SummaryBadge {
        self.inner.engine.state.read(|s| s.steps.summary_badge(kind))
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.inner.engine.state.snapshot()
    }

    /// Receiver of every committed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.inner.engine.state.subscribe()
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.inner.engine.registry
    }

    /// Stop any active run and the worker. A run still mid-call is closed
    /// out as cancelled, pending `start_run` calls resolve as superseded and
    /// later calls are ignored.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = &self.inner.engine;
        if let Some(summary) = engine.state.mutate(|s| s.abandon_current(now_ms())) {
            engine.report_completed(&summary);
        }
        self.cancel_current();
        let worker = self.inner.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(worker) = worker {
            worker.abort();
            tracing::debug!("orchestrator disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst) || self.inner.jobs.is_closed()
    }

    fn cancel_current(&self) {
        let slot = self.inner.cancel.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(token) = slot.as_ref() {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("settings", &self.inner.settings)
            .field("state", &self.inner.engine.state)
            .finish()
    }
}

/// Builder for `AnalysisOrchestrator`.
pub struct OrchestratorBuilder {
    transport: Arc<dyn StepTransport>,
    settings: OrchestratorSettings,
    telemetry: Arc<dyn TelemetrySink>,
    persistence: Option<Arc<SnapshotStore>>,
}

impl OrchestratorBuilder {
    pub fn new(transport: Arc<dyn StepTransport>) -> Self {
        Self {
            transport,
            settings: OrchestratorSettings::default(),
            telemetry: Arc::new(NoopSink),
            persistence: None,
        }
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Mirror every mutation to `store` and restore from it on build.
    pub fn persistence(mut self, store: Arc<SnapshotStore>) -> Self {
        self.persistence = Some(store);
        self
    }

    /// Build the orchestrator and spawn its worker on the current runtime.
    pub fn build(self) -> AnalysisOrchestrator {
        let registry = Arc::new(StepRegistry::new().with_disabled(self.settings.disabled_steps.iter().copied()));
        let initial = self
            .persistence
            .as_ref()
            .map(|store| store.load())
            .unwrap_or_default();
        let state = Arc::new(SharedRunState::new(initial, self.persistence.clone()));
        let executor = StepExecutor::new(registry.clone(), self.transport, self.telemetry.clone());

        let engine = Arc::new(RunEngine {
            registry,
            state,
            executor,
            telemetry: self.telemetry,
        });

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(worker_loop(engine.clone(), jobs_rx));

        AnalysisOrchestrator {
            inner: Arc::new(Inner {
                engine,
                settings: self.settings,
                persistence: self.persistence,
                jobs: jobs_tx,
                cancel: Mutex::new(None),
                worker: Mutex::new(Some(worker)),
                disposed: AtomicBool::new(false),
            }),
        }
    }
}
