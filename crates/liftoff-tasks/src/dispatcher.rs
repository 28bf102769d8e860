//! Push-based dispatch of a planned run.
//!
//! Every node is handed to an executor by [`Run::dispatch`], both when the
//! run is seeded and when a finishing task observes a dependent's remaining
//! count reach zero. `in_flight` counts submitted jobs plus one seed token;
//! whoever brings it to zero either releases held-back work or finalizes the
//! run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use liftoff_core::DependencyPolicy;

use crate::error::RunError;
use crate::executor::WorkerPool;
use crate::history::DurationHistory;
use crate::latch::CountDownLatch;
use crate::plan::ExecutionPlan;
use crate::reporter::{TaskEvent, TaskReporterRegistry};
use crate::scheduler::RunPhase;
use crate::tracker::{RunReport, StateTracker};

#[derive(Debug, Default)]
struct Deferred {
    open: bool,
    parked: Vec<usize>,
}

/// Runtime state of one started run
pub(crate) struct Run {
    plan: ExecutionPlan,
    policy: DependencyPolicy,
    max_reported_failures: usize,
    confined: WorkerPool,
    pooled: WorkerPool,
    tracker: StateTracker,
    reporters: Arc<TaskReporterRegistry>,
    history: Option<Arc<DurationHistory>>,
    /// Opens when every barrier node settled, or earlier on abort or stall
    barrier: CountDownLatch,
    /// Opens when the run is finalized
    done: CountDownLatch,
    phase: watch::Sender<RunPhase>,
    in_flight: AtomicUsize,
    aborted: AtomicBool,
    /// Set when the starter is released by a run failure
    failed_before_barrier: AtomicBool,
    finalized: AtomicBool,
    deferred: Mutex<Deferred>,
    started: Instant,
    started_at: DateTime<Utc>,
    barrier_wait: OnceLock<Duration>,
    failure: OnceLock<Arc<RunError>>,
    report: OnceLock<Arc<RunReport>>,
}

pub(crate) struct RunSettings {
    pub policy: DependencyPolicy,
    pub max_reported_failures: usize,
    pub reporters: Arc<TaskReporterRegistry>,
    pub history: Option<Arc<DurationHistory>>,
}

impl Run {
    pub(crate) fn new(
        plan: ExecutionPlan,
        confined: WorkerPool,
        pooled: WorkerPool,
        phase: watch::Sender<RunPhase>,
        settings: RunSettings,
    ) -> Arc<Self> {
        let ids = plan.graph().nodes().iter().map(|n| n.id().clone()).collect();
        let barrier = CountDownLatch::new(plan.barrier_count());

        Arc::new(Self {
            policy: settings.policy,
            max_reported_failures: settings.max_reported_failures,
            confined,
            pooled,
            tracker: StateTracker::new(ids),
            reporters: settings.reporters,
            history: settings.history,
            barrier,
            done: CountDownLatch::new(1),
            phase,
            in_flight: AtomicUsize::new(1),
            aborted: AtomicBool::new(false),
            failed_before_barrier: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            deferred: Mutex::new(Deferred::default()),
            started: Instant::now(),
            started_at: Utc::now(),
            barrier_wait: OnceLock::new(),
            failure: OnceLock::new(),
            report: OnceLock::new(),
            plan,
        })
    }

    /// Dispatch the ready roots, then drop the seed token
    pub(crate) fn seed(self: &Arc<Self>) {
        self.phase.send_replace(RunPhase::Running);
        info!(
            tasks = self.plan.len(),
            blocking = self.plan.barrier_count(),
            strategy = %self.plan.strategy(),
            "starting run"
        );

        if self.plan.barrier_count() == 0 {
            self.barrier_opened(false);
        }
        for idx in self.plan.seed_order() {
            self.dispatch(idx);
        }
        self.finish_one();
    }

    fn dispatch(self: &Arc<Self>, idx: usize) {
        if self.aborted.load(Ordering::Acquire) {
            return;
        }

        let task = self.plan.graph().node(idx).task();
        if task.is_deferred() {
            let mut deferred = self.lock_deferred();
            if !deferred.open {
                debug!(task = %task.id(), "deferred until critical tasks complete");
                deferred.parked.push(idx);
                return;
            }
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let pool = if task.is_confined() {
            &self.confined
        } else {
            &self.pooled
        };
        let run = Arc::clone(self);
        if let Err(e) = pool.submit(self.plan.key(idx), Box::new(move || run.execute(idx))) {
            warn!(task = %task.id(), error = %e, "task not dispatched");
            self.finish_one();
        }
    }

    fn execute(self: &Arc<Self>, idx: usize) {
        let node = self.plan.graph().node(idx);
        let task = node.task();

        if self.aborted.load(Ordering::Acquire) || !self.tracker.begin(idx) {
            debug!(task = %task.id(), "skipped");
            self.finish_one();
            return;
        }

        self.reporters.broadcast(&TaskEvent::Started {
            id: task.id().clone(),
            affinity: task.affinity(),
            key: self.plan.key(idx),
        });

        let start = Instant::now();
        let outcome = match catch_unwind(AssertUnwindSafe(|| task.execute())) {
            Ok(result) => result,
            Err(panic) => Err(anyhow::anyhow!("task panicked: {}", panic_message(&*panic))),
        };
        let duration = start.elapsed();

        if let Some(history) = &self.history {
            history.record(task.id(), duration);
        }

        self.complete(idx, outcome.err().map(Arc::new), duration);
        self.finish_one();
    }

    fn complete(self: &Arc<Self>, idx: usize, cause: Option<Arc<anyhow::Error>>, duration: Duration) {
        let node = self.plan.graph().node(idx);
        let task = node.task();
        let succeeded = cause.is_none();

        let fraction = self.tracker.finish(idx, cause.clone(), duration);
        match cause {
            None => self.reporters.broadcast(&TaskEvent::Completed {
                id: task.id().clone(),
                duration,
            }),
            Some(cause) => {
                self.reporters.broadcast(&TaskEvent::Failed {
                    id: task.id().clone(),
                    duration,
                    error: format!("{:#}", cause),
                    critical: task.is_critical(),
                });
                if task.is_critical() {
                    self.abort(idx, cause);
                }
            }
        }
        self.reporters.broadcast(&TaskEvent::Progress {
            settled: self.tracker.settled(),
            total: self.tracker.total(),
            fraction,
        });

        if self.plan.is_barrier(idx) && self.barrier.count_down() {
            self.barrier_opened(false);
        }

        if succeeded || self.policy == DependencyPolicy::AnyTerminal {
            for &dependent in node.dependents() {
                if self.plan.graph().node(dependent).satisfy_one() {
                    self.dispatch(dependent);
                }
            }
        }
    }

    /// First critical failure stops all new work
    fn abort(self: &Arc<Self>, idx: usize, cause: Arc<anyhow::Error>) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }

        let error = Arc::new(RunError::CriticalTaskFailed {
            task: self.plan.graph().node(idx).id().clone(),
            failed: self.tracker.failed_count(),
            cause: cause.into(),
        });
        error!(error = %error, "aborting startup");
        self.fail(error);
        if self.barrier.release() {
            self.barrier_opened(true);
        }
    }

    /// Record the run failure and tell observers. Must run before the
    /// barrier is released so the starter sees it.
    fn fail(&self, error: Arc<RunError>) {
        let _ = self.failure.set(error.clone());
        self.reporters.broadcast(&TaskEvent::RunFailed { error });
        if !self.barrier.is_open() {
            self.failed_before_barrier.store(true, Ordering::Release);
        }
    }

    fn stranded_error(&self) -> Arc<RunError> {
        Arc::new(RunError::Deadlock {
            pending: self.tracker.pending(),
        })
    }

    fn barrier_opened(self: &Arc<Self>, early: bool) {
        let elapsed = self.started.elapsed();
        let _ = self.barrier_wait.set(elapsed);
        self.reporters
            .broadcast(&TaskEvent::BarrierReleased { elapsed, early });
        self.flush_deferred();
    }

    fn flush_deferred(self: &Arc<Self>) {
        let parked = {
            let mut deferred = self.lock_deferred();
            deferred.open = true;
            std::mem::take(&mut deferred.parked)
        };
        if !parked.is_empty() {
            debug!(count = parked.len(), "releasing deferred tasks");
        }
        for idx in parked {
            self.dispatch(idx);
        }
    }

    fn lock_deferred(&self) -> MutexGuard<'_, Deferred> {
        self.deferred.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finish_one(self: &Arc<Self>) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        // Nothing is queued or running. Anything held back is released now;
        // if that dispatches work, its completion comes back here.
        let stalled = !self.barrier.is_open();
        let has_parked = !self.lock_deferred().parked.is_empty();
        if stalled || has_parked {
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            let remaining = self.barrier.count();
            // Without parked work nothing can ever run again
            if stalled && !has_parked && self.failure.get().is_none() {
                let error = self.stranded_error();
                error!(error = %error, "startup stalled before critical tasks completed");
                self.fail(error);
            }
            if self.barrier.release() {
                warn!(remaining, "critical tasks cannot complete, releasing starter");
                self.barrier_opened(true);
            } else {
                self.flush_deferred();
            }
            self.finish_one();
            return;
        }

        self.finalize();
    }

    fn finalize(&self) {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return;
        }

        let failure = match self.failure.get() {
            Some(failure) => Some(failure.clone()),
            None if !self.tracker.pending().is_empty() => {
                let error = self.stranded_error();
                error!(error = %error, "startup stalled");
                self.fail(error.clone());
                Some(error)
            }
            None => None,
        };

        let total = self.started.elapsed();
        let report = Arc::new(self.tracker.report(
            self.started_at,
            total,
            self.barrier_wait.get().copied(),
            failure.as_ref().map(|e| e.to_string()),
            self.max_reported_failures,
        ));

        if failure.is_none() {
            if report.failed_count > 0 {
                warn!(
                    failed = report.failed_count,
                    "startup completed with non-critical failures"
                );
            }
            self.reporters
                .broadcast(&TaskEvent::RunSucceeded { duration: total });
        }

        let _ = self.report.set(report.clone());
        self.reporters.broadcast(&TaskEvent::RunFinished { report });

        self.confined.close();
        self.pooled.close();
        self.phase.send_replace(RunPhase::Completed);
        self.done.count_down();
    }

    /// Block until the barrier opens
    pub(crate) fn wait_barrier(&self) {
        self.barrier.wait();
    }

    /// The run failure that released the starter, if any
    pub(crate) fn early_failure(&self) -> Option<Arc<RunError>> {
        if self.failed_before_barrier.load(Ordering::Acquire) {
            self.failure.get().cloned()
        } else {
            None
        }
    }

    pub(crate) fn wait_done(&self, timeout: Duration) -> bool {
        self.done.wait_timeout(timeout)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.is_open()
    }

    pub(crate) fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub(crate) fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub(crate) fn report(&self) -> Option<Arc<RunReport>> {
        self.report.get().cloned()
    }

    pub(crate) fn failure(&self) -> Option<Arc<RunError>> {
        self.failure.get().cloned()
    }

    /// Wait for the run to finish, then join both pools. Bounded by `grace`.
    pub(crate) fn shutdown(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let finished = self.done.wait_timeout(grace);
        if !finished {
            warn!(grace_secs = grace.as_secs(), "run still in progress at shutdown");
        }

        self.confined.close();
        self.pooled.close();
        let confined = self
            .confined
            .shutdown(deadline.saturating_duration_since(Instant::now()));
        let pooled = self
            .pooled
            .shutdown(deadline.saturating_duration_since(Instant::now()));
        finished && confined && pooled
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
