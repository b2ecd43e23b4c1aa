//! Run controller for timetable generation.
//!
//! Each submitted scenario becomes a run driven by its own tokio task. The
//! task is the only writer of the run's status, published through a
//! [`watch`] channel that any number of readers (queries, SSE streams) can
//! observe. The engine itself runs on the blocking pool.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::console;
use crate::constraints::{ConstraintEvaluator, Evaluator, Score};
use crate::domain::{Assignment, Problem, ScenarioConfig, Schedule};
use crate::error::{ConfigurationError, RunError, SearchFailure, TransitionError};
use crate::explain::{explain, Report};
use crate::search::{self, Progress, SearchOptions, SearchOutcome, SearchStats, StopReason};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Canceled,
    Failed,
}

impl RunStatus {
    /// Returns the status as a SCREAMING_SNAKE_CASE string for API responses.
    ///
    /// ```
    /// use timely_scheduler::solver::RunStatus;
    ///
    /// assert_eq!(RunStatus::Queued.as_str(), "QUEUED");
    /// assert_eq!(RunStatus::Canceled.as_str(), "CANCELED");
    /// ```
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "QUEUED",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Canceled => "CANCELED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Canceled | RunStatus::Failed
        )
    }

    /// Validates a status change.
    ///
    /// ```
    /// use timely_scheduler::solver::RunStatus;
    ///
    /// assert_eq!(RunStatus::Queued.transition(RunStatus::Running), Ok(RunStatus::Running));
    /// assert!(RunStatus::Completed.transition(RunStatus::Running).is_err());
    /// ```
    pub fn transition(self, to: RunStatus) -> Result<RunStatus, TransitionError> {
        use RunStatus::*;
        match (self, to) {
            (Queued, Running) | (Queued, Canceled) => Ok(to),
            (Running, Completed) | (Running, Canceled) | (Running, Failed) => Ok(to),
            _ => Err(TransitionError { from: self, to }),
        }
    }
}

/// What to do with a run that ends without a feasible schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum InfeasiblePolicy {
    /// Complete with a warning; the partial schedule stays fetchable.
    #[default]
    CompleteWithWarning,
    Fail,
}

/// Non-fatal warning attached to a completed but infeasible run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfeasibilityWarning {
    pub violation_count: usize,
    pub message: String,
}

/// Point-in-time view of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub scenario: String,
    pub status: RunStatus,
    /// 0..=100, non-decreasing; 100 only once terminal.
    pub progress: u8,
    #[schema(value_type = String)]
    pub submitted_at: DateTime<Utc>,
    #[schema(value_type = Option<String>)]
    pub started_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub finished_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub result_schedule_id: Option<Uuid>,
    pub note: Option<String>,
    pub warning: Option<InfeasibilityWarning>,
    pub best_score: Option<Score>,
}

/// Finalized output of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: Uuid,
    pub schedule_id: Uuid,
    pub problem: Arc<Problem>,
    pub schedule: Schedule,
    pub assignments: Vec<Assignment>,
    pub score: Score,
    pub report: Report,
    pub warning: Option<InfeasibilityWarning>,
    pub stop_reason: StopReason,
    pub stats: SearchStats,
}

/// Kept for failed runs.
#[derive(Debug, Clone)]
pub struct FailureDiagnostics {
    pub config: Arc<ScenarioConfig>,
    pub last_schedule: Option<Schedule>,
    pub error: String,
}

struct Run {
    config: Arc<ScenarioConfig>,
    cancel: CancellationToken,
    status: watch::Receiver<RunSnapshot>,
    result: RwLock<Option<Arc<RunResult>>>,
    diagnostics: RwLock<Option<FailureDiagnostics>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Shared by every worker.
#[derive(Clone)]
struct WorkerContext {
    evaluator: Arc<dyn Evaluator>,
    permits: Arc<Semaphore>,
    policy: InfeasiblePolicy,
    report_top_n: usize,
    console_output: bool,
}

/// Manages timetable runs.
///
/// # Examples
///
/// ```
/// use timely_scheduler::config::ServiceConfig;
/// use timely_scheduler::demo_data::{generate, DemoData};
/// use timely_scheduler::solver::{RunService, RunStatus};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let service = RunService::new(ServiceConfig::default());
///     let mut config = generate(DemoData::Small);
///     config.termination.step_limit = Some(100);
///
///     let id = service.submit(config).unwrap();
///     let done = service.wait_for_terminal(id).await.unwrap();
///     assert_eq!(done.status, RunStatus::Completed);
///     assert_eq!(done.progress, 100);
/// });
/// ```
pub struct RunService {
    runs: RwLock<HashMap<Uuid, Arc<Run>>>,
    context: WorkerContext,
}

impl RunService {
    /// Creates a service scoring with [`ConstraintEvaluator`].
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_evaluator(config, Arc::new(ConstraintEvaluator))
    }

    pub fn with_evaluator(config: ServiceConfig, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            context: WorkerContext {
                evaluator,
                permits: Arc::new(Semaphore::new(config.max_concurrent_runs.max(1))),
                policy: config.infeasible_policy,
                report_top_n: config.report_top_n,
                console_output: config.console_output,
            },
        }
    }

    /// Validates `config` and queues a run for it.
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    pub fn submit(&self, config: ScenarioConfig) -> Result<Uuid, ConfigurationError> {
        let problem = Arc::new(Problem::from_config(&config)?);
        let id = Uuid::new_v4();
        let snapshot = RunSnapshot {
            id,
            scenario: config.name.clone(),
            status: RunStatus::Queued,
            progress: 0,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result_schedule_id: None,
            note: None,
            warning: None,
            best_score: None,
        };
        let (tx, rx) = watch::channel(snapshot);
        let run = Arc::new(Run {
            config: Arc::new(config),
            cancel: CancellationToken::new(),
            status: rx,
            result: RwLock::new(None),
            diagnostics: RwLock::new(None),
            worker: Mutex::new(None),
        });

        info!(
            run_id = %id,
            sessions = problem.sessions.len(),
            rooms = problem.rooms.len(),
            cohorts = problem.cohorts.len(),
            "Run submitted"
        );

        self.runs.write().insert(id, run.clone());
        let handle = tokio::spawn(drive(run.clone(), problem, tx, self.context.clone()));
        *run.worker.lock() = Some(handle);
        Ok(id)
    }

    /// Current snapshot of a run.
    pub fn status(&self, id: Uuid) -> Result<RunSnapshot, RunError> {
        Ok(self.get(id)?.status.borrow().clone())
    }

    /// Requests cancellation. Idempotent; terminal runs are left untouched.
    pub fn cancel(&self, id: Uuid) -> Result<RunSnapshot, RunError> {
        let run = self.get(id)?;
        if !run.status.borrow().status.is_terminal() {
            info!(run_id = %id, "Cancellation requested");
            run.cancel.cancel();
        }
        let snapshot = run.status.borrow().clone();
        Ok(snapshot)
    }

    /// Result of a completed run.
    pub fn fetch_result(&self, id: Uuid) -> Result<Arc<RunResult>, RunError> {
        let run = self.get(id)?;
        let status = run.status.borrow().status;
        let result = run.result.read().clone();
        match (status, result) {
            (RunStatus::Completed, Some(result)) => Ok(result),
            _ => Err(RunError::NotCompleted { id, status }),
        }
    }

    /// Receiver that observes every status and progress change.
    pub fn subscribe(&self, id: Uuid) -> Result<watch::Receiver<RunSnapshot>, RunError> {
        Ok(self.get(id)?.status.clone())
    }

    /// Waits until the run reaches a terminal status.
    pub async fn wait_for_terminal(&self, id: Uuid) -> Result<RunSnapshot, RunError> {
        let mut rx = self.subscribe(id)?;
        let waited = rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .map(|s| s.clone());
        match waited {
            Ok(snapshot) => Ok(snapshot),
            Err(_) => Ok(rx.borrow().clone()),
        }
    }

    /// Config snapshot and last schedule of a failed run.
    pub fn diagnostics(&self, id: Uuid) -> Result<Option<FailureDiagnostics>, RunError> {
        Ok(self.get(id)?.diagnostics.read().clone())
    }

    /// Scenario submitted for a run.
    pub fn scenario(&self, id: Uuid) -> Result<Arc<ScenarioConfig>, RunError> {
        Ok(self.get(id)?.config.clone())
    }

    /// Snapshots of every run, oldest first.
    pub fn list_runs(&self) -> Vec<RunSnapshot> {
        let mut runs: Vec<RunSnapshot> = self
            .runs
            .read()
            .values()
            .map(|r| r.status.borrow().clone())
            .collect();
        runs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
        runs
    }

    /// Cancels every run and waits for all workers to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .runs
            .read()
            .values()
            .filter_map(|run| {
                run.cancel.cancel();
                run.worker.lock().take()
            })
            .collect();
        info!(runs = handles.len(), "Shutting down run service");
        for outcome in futures::future::join_all(handles).await {
            if let Err(e) = outcome {
                warn!(error = %e, "Run worker ended abnormally");
            }
        }
    }

    fn get(&self, id: Uuid) -> Result<Arc<Run>, RunError> {
        self.runs.read().get(&id).cloned().ok_or(RunError::NotFound(id))
    }
}

/// Applies a transition and publishes it. Illegal transitions are logged and dropped.
fn publish_transition(
    tx: &watch::Sender<RunSnapshot>,
    to: RunStatus,
    update: impl FnOnce(&mut RunSnapshot),
) {
    let mut rejected = None;
    tx.send_if_modified(|snapshot| match snapshot.status.transition(to) {
        Ok(next) => {
            snapshot.status = next;
            if next.is_terminal() {
                snapshot.finished_at = Some(Utc::now());
                snapshot.progress = 100;
            }
            update(snapshot);
            true
        }
        Err(e) => {
            rejected = Some(e);
            false
        }
    });
    if let Some(e) = rejected {
        warn!(run_id = %tx.borrow().id, error = %e, "Dropped status change");
    }
}

enum WorkerOutcome {
    Finished(SearchOutcome),
    Failed(SearchFailure),
    Panicked(String),
}

async fn drive(
    run: Arc<Run>,
    problem: Arc<Problem>,
    tx: watch::Sender<RunSnapshot>,
    ctx: WorkerContext,
) {
    let id = tx.borrow().id;

    // Stay queued until a permit frees up or the run is cancelled.
    let permit = tokio::select! {
        biased;
        _ = run.cancel.cancelled() => None,
        permit = ctx.permits.clone().acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit else {
        info!(run_id = %id, "Run canceled before start");
        publish_transition(&tx, RunStatus::Canceled, |s| {
            s.note = Some("Canceled before start".to_string());
        });
        return;
    };

    publish_transition(&tx, RunStatus::Running, |s| s.started_at = Some(Utc::now()));
    info!(run_id = %id, "Run started");
    if ctx.console_output {
        console::print_config(&problem);
    }

    let started = Instant::now();
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Progress>();
    let options = SearchOptions::from_problem(&problem);
    let worker = {
        let problem = problem.clone();
        let evaluator = ctx.evaluator.clone();
        let cancel = run.cancel.clone();
        tokio::task::spawn_blocking(move || {
            let mut report = |p: Progress| {
                let _ = progress_tx.send(p);
            };
            search::run(&problem, evaluator.as_ref(), options, &cancel, &mut report)
        })
    };
    tokio::pin!(worker);

    let joined = loop {
        tokio::select! {
            Some(p) = progress_rx.recv() => republish(&tx, p, ctx.console_output),
            joined = &mut worker => break joined,
        }
    };
    while let Ok(p) = progress_rx.try_recv() {
        republish(&tx, p, ctx.console_output);
    }

    let outcome = match joined {
        Ok(Ok(outcome)) => WorkerOutcome::Finished(outcome),
        Ok(Err(failure)) => WorkerOutcome::Failed(failure),
        Err(e) => WorkerOutcome::Panicked(e.to_string()),
    };
    finalize(&run, &problem, &tx, &ctx, outcome, started);
}

fn republish(tx: &watch::Sender<RunSnapshot>, p: Progress, console_output: bool) {
    let mut crossed_decile = false;
    tx.send_if_modified(|s| {
        if s.status != RunStatus::Running {
            return false;
        }
        crossed_decile = p.percent / 10 > s.progress / 10;
        s.progress = s.progress.max(p.percent);
        s.best_score = Some(p.best);
        true
    });
    if console_output && crossed_decile {
        console::print_step_progress(p.iteration, p.elapsed, p.iteration, &p.best.to_string());
    }
}

fn finalize(
    run: &Run,
    problem: &Arc<Problem>,
    tx: &watch::Sender<RunSnapshot>,
    ctx: &WorkerContext,
    outcome: WorkerOutcome,
    started: Instant,
) {
    let id = tx.borrow().id;
    let outcome = match outcome {
        WorkerOutcome::Finished(outcome) => outcome,
        WorkerOutcome::Failed(failure) => {
            warn!(run_id = %id, error = %failure.error, "Run failed");
            fail(run, tx, failure.last_schedule, failure.error.to_string());
            return;
        }
        WorkerOutcome::Panicked(message) => {
            warn!(run_id = %id, error = %message, "Run worker panicked");
            fail(run, tx, None, format!("worker panicked: {}", message));
            return;
        }
    };

    if ctx.console_output {
        console::print_phase_end(
            "Construction",
            0,
            outcome.stats.construction_time,
            outcome.schedule.placed_count() as u64,
            problem.sessions.len() as u64,
            &outcome.trajectory.first().map(|b| b.score).unwrap_or_default().to_string(),
        );
        console::print_phase_end(
            "Annealing",
            1,
            outcome.stats.elapsed,
            outcome.stats.accepted_moves,
            outcome.stats.iterations,
            &outcome.score.to_string(),
        );
        console::print_solving_ended(
            started.elapsed(),
            outcome.stats.iterations,
            2,
            &outcome.score.to_string(),
            outcome.feasible,
        );
    }

    if outcome.stop_reason == StopReason::Cancelled {
        info!(run_id = %id, iterations = outcome.stats.iterations, "Run canceled");
        publish_transition(tx, RunStatus::Canceled, |s| {
            s.note = Some("Canceled by request".to_string());
            s.best_score = Some(outcome.score);
        });
        return;
    }

    let warning = (!outcome.feasible).then(|| InfeasibilityWarning {
        violation_count: outcome.violations.len(),
        message: format!(
            "No feasible timetable found; best schedule has {} hard violations",
            outcome.violations.len()
        ),
    });

    if let (Some(warning), InfeasiblePolicy::Fail) = (&warning, ctx.policy) {
        warn!(run_id = %id, violations = warning.violation_count, "Run infeasible");
        fail(run, tx, Some(outcome.schedule), warning.message.clone());
        return;
    }

    let report = explain(
        problem,
        &outcome.schedule,
        &outcome.violations,
        &outcome.soft,
        ctx.report_top_n,
    )
    .with_blocked_moves(&outcome.stats.blocked_moves);
    let schedule_id = Uuid::new_v4();
    let result = RunResult {
        run_id: id,
        schedule_id,
        problem: problem.clone(),
        assignments: outcome.schedule.assignments(problem),
        schedule: outcome.schedule,
        score: outcome.score,
        report,
        warning: warning.clone(),
        stop_reason: outcome.stop_reason,
        stats: outcome.stats,
    };
    *run.result.write() = Some(Arc::new(result));

    info!(
        run_id = %id,
        score = %outcome.score,
        feasible = outcome.feasible,
        reason = ?outcome.stop_reason,
        duration_secs = started.elapsed().as_secs_f64(),
        "Run completed"
    );
    publish_transition(tx, RunStatus::Completed, |s| {
        s.result_schedule_id = Some(schedule_id);
        s.best_score = Some(outcome.score);
        s.warning = warning;
    });
}

fn fail(
    run: &Run,
    tx: &watch::Sender<RunSnapshot>,
    last_schedule: Option<Schedule>,
    error: String,
) {
    *run.diagnostics.write() = Some(FailureDiagnostics {
        config: run.config.clone(),
        last_schedule,
        error: error.clone(),
    });
    publish_transition(tx, RunStatus::Failed, |s| s.note = Some(error));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_data::{generate, DemoData};
    use crate::search::tests::{crowded_config, PoisonedEvaluator, SlowEvaluator};
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    fn quick(demo: DemoData, steps: u64) -> ScenarioConfig {
        let mut config = generate(demo);
        config.termination.step_limit = Some(steps);
        config
    }

    #[test]
    fn test_transitions() {
        use RunStatus::*;
        assert!(Queued.transition(Canceled).is_ok());
        assert!(Running.transition(Failed).is_ok());
        assert!(Queued.transition(Completed).is_err());
        for terminal in [Completed, Canceled, Failed] {
            for to in [Queued, Running, Completed, Canceled, Failed] {
                assert_eq!(
                    terminal.transition(to),
                    Err(TransitionError { from: terminal, to })
                );
            }
        }
    }

    #[tokio::test]
    async fn test_small_scenario_completes_feasible() {
        let service = RunService::new(ServiceConfig::default());
        let id = service.submit(quick(DemoData::Small, 500)).unwrap();
        let done = service.wait_for_terminal(id).await.unwrap();

        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.warning.is_none());
        assert!(done.started_at.is_some() && done.finished_at.is_some());

        let result = service.fetch_result(id).unwrap();
        assert_eq!(Some(result.schedule_id), done.result_schedule_id);
        assert!(result.report.feasible);
        assert!(result.report.violations.is_empty());
        assert_eq!(result.assignments.len(), result.problem.sessions.len());
    }

    #[tokio::test]
    async fn test_small_scenario_within_one_minute_budget() {
        let service = RunService::new(ServiceConfig::default());
        let mut config = generate(DemoData::Small);
        config.time_budget_minutes = 1.0;
        config.termination.step_limit = None;
        let id = service.submit(config).unwrap();

        let done = tokio::time::timeout(Duration::from_secs(70), service.wait_for_terminal(id))
            .await
            .expect("run outlived its budget")
            .unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.warning.is_none());
        assert!(service.fetch_result(id).unwrap().report.feasible);
    }

    #[tokio::test]
    async fn test_budget_bounds_slow_construction() {
        let service = RunService::new(ServiceConfig::default());
        let config = crowded_config();
        let budget = Duration::from_secs_f64(config.time_budget_minutes * 60.0);
        let id = service.submit(config).unwrap();

        let done = tokio::time::timeout(
            budget + Duration::from_secs(2),
            service.wait_for_terminal(id),
        )
        .await
        .expect("construction ran past the budget")
        .unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        let result = service.fetch_result(id).unwrap();
        assert_eq!(result.stop_reason, StopReason::BudgetExhausted);
    }

    #[tokio::test]
    async fn test_zero_rooms_rejected() {
        let service = RunService::new(ServiceConfig::default());
        let mut config = generate(DemoData::Small);
        config.rooms.clear();
        assert_eq!(service.submit(config).unwrap_err(), ConfigurationError::NoRooms);
        assert!(service.list_runs().is_empty());
    }

    #[tokio::test]
    async fn test_oversubscribed_completes_with_warning() {
        let service = RunService::new(ServiceConfig::default());
        let id = service.submit(quick(DemoData::Oversubscribed, 200)).unwrap();
        let done = service.wait_for_terminal(id).await.unwrap();

        assert_eq!(done.status, RunStatus::Completed);
        let warning = done.warning.unwrap();
        assert!(warning.violation_count > 0);

        let result = service.fetch_result(id).unwrap();
        assert!(!result.report.feasible);
        assert!(result.report.violations.iter().any(|v| v.message.contains("too small")));
    }

    #[tokio::test]
    async fn test_oversubscribed_fails_under_fail_policy() {
        let service = RunService::new(ServiceConfig {
            infeasible_policy: InfeasiblePolicy::Fail,
            ..ServiceConfig::default()
        });
        let id = service.submit(quick(DemoData::Oversubscribed, 200)).unwrap();
        let done = service.wait_for_terminal(id).await.unwrap();

        assert_eq!(done.status, RunStatus::Failed);
        assert!(matches!(
            service.fetch_result(id),
            Err(RunError::NotCompleted { status: RunStatus::Failed, .. })
        ));
        let diagnostics = service.diagnostics(id).unwrap().unwrap();
        assert!(diagnostics.last_schedule.is_some());
        assert_eq!(diagnostics.config.name, "FYUGP oversubscribed");
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_synchronously() {
        let service = RunService::new(ServiceConfig::default());
        let mut config = generate(DemoData::Small);
        config.term.start = None;
        assert_eq!(
            service.submit(config).unwrap_err(),
            ConfigurationError::MissingTermDates
        );
        assert!(service.list_runs().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_100ms() {
        let service = RunService::with_evaluator(
            ServiceConfig::default(),
            Arc::new(SlowEvaluator(Duration::from_millis(20))),
        );
        let mut config = generate(DemoData::Large);
        config.time_budget_minutes = 1.0;
        let id = service.submit(config).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        service.cancel(id).unwrap();
        let done = tokio::time::timeout(Duration::from_secs(2), service.wait_for_terminal(id))
            .await
            .expect("run did not stop")
            .unwrap();

        assert_eq!(done.status, RunStatus::Canceled);
        assert!(service.fetch_result(id).is_err());
        // Cancelling again is a no-op.
        assert_eq!(service.cancel(id).unwrap().status, RunStatus::Canceled);
    }

    #[tokio::test]
    async fn test_queued_run_can_be_canceled() {
        let service = RunService::with_evaluator(
            ServiceConfig {
                max_concurrent_runs: 1,
                ..ServiceConfig::default()
            },
            Arc::new(SlowEvaluator(Duration::from_millis(10))),
        );
        let mut long = generate(DemoData::Large);
        long.time_budget_minutes = 1.0;
        let first = service.submit(long.clone()).unwrap();
        let second = service.submit(long).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.status(second).unwrap().status, RunStatus::Queued);

        service.cancel(second).unwrap();
        let done = service.wait_for_terminal(second).await.unwrap();
        assert_eq!(done.status, RunStatus::Canceled);
        assert!(done.started_at.is_none());

        service.shutdown().await;
        assert!(service.status(first).unwrap().status.is_terminal());
    }

    #[tokio::test]
    async fn test_engine_error_fails_run_with_diagnostics() {
        let service = RunService::with_evaluator(
            ServiceConfig::default(),
            Arc::new(PoisonedEvaluator {
                calls_before_nan: 3,
                calls: AtomicU64::new(0),
            }),
        );
        let id = service.submit(quick(DemoData::Large, 1_000)).unwrap();
        let done = service.wait_for_terminal(id).await.unwrap();

        assert_eq!(done.status, RunStatus::Failed);
        assert!(done.note.unwrap().contains("invalid soft cost"));
        let diagnostics = service.diagnostics(id).unwrap().unwrap();
        assert!(diagnostics.last_schedule.is_some());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let service = RunService::with_evaluator(
            ServiceConfig::default(),
            Arc::new(SlowEvaluator(Duration::from_micros(200))),
        );
        let mut config = generate(DemoData::Large);
        config.time_budget_minutes = 0.005;
        let id = service.submit(config).unwrap();

        let mut rx = service.subscribe(id).unwrap();
        let mut seen = vec![rx.borrow().progress];
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow().clone();
            seen.push(snapshot.progress);
            if snapshot.status.is_terminal() {
                break;
            }
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let service = RunService::new(ServiceConfig::default());
        let id = Uuid::new_v4();
        assert_eq!(service.status(id), Err(RunError::NotFound(id)));
        assert_eq!(service.cancel(id), Err(RunError::NotFound(id)));
    }
}
