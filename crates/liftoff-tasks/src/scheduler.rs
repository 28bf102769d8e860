//! Startup scheduler: registers tasks, starts the run and exposes its state

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use liftoff_core::config::{SchedulerConfig, DEFAULT_MAX_REPORTED_FAILURES, DEFAULT_SHUTDOWN_GRACE_SECS};
use liftoff_core::{DependencyPolicy, SchedulingStrategy};

use crate::dag::GraphError;
use crate::dispatcher::{Run, RunSettings};
use crate::error::{RunError, SchedulerError};
use crate::executor::WorkerPool;
use crate::history::DurationHistory;
use crate::plan::ExecutionPlan;
use crate::reporter::{TaskEvent, TaskReporter, TaskReporterRegistry};
use crate::task::{SharedTask, StartupTask, TaskId};
use crate::tracker::{RunReport, TaskState};

/// Options for the startup scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// How ready tasks are ordered and which tasks the starter waits for
    pub strategy: SchedulingStrategy,
    /// When a dependent may start
    pub dependency_policy: DependencyPolicy,
    /// Worker threads in the pooled executor
    pub pool_threads: usize,
    /// Bounded wait when shutting the executors down
    pub shutdown_grace: Duration,
    /// Failures kept in the run report
    pub max_reported_failures: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            strategy: SchedulingStrategy::default(),
            dependency_policy: DependencyPolicy::default(),
            pool_threads: default_pool_threads(),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            max_reported_failures: DEFAULT_MAX_REPORTED_FAILURES,
        }
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            strategy: config.strategy,
            dependency_policy: config.dependency_policy,
            pool_threads: config.pool_threads.unwrap_or_else(default_pool_threads),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            max_reported_failures: config.max_reported_failures,
        }
    }
}

/// Larger plans are not rendered into the debug log
const TREE_LOG_LIMIT: usize = 200;

fn default_pool_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .max(2)
}

/// Lifecycle of a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunPhase {
    NotStarted,
    Running,
    Completed,
}

/// Runs a set of startup tasks once, in dependency order
pub struct StartupScheduler {
    options: SchedulerOptions,
    tasks: Vec<SharedTask>,
    registered: HashSet<TaskId>,
    reporters: TaskReporterRegistry,
    history: Option<Arc<DurationHistory>>,
    phase_tx: Option<watch::Sender<RunPhase>>,
    phase_rx: watch::Receiver<RunPhase>,
    run: Option<Arc<Run>>,
}

impl StartupScheduler {
    /// Create a scheduler that logs events through tracing
    pub fn new(options: SchedulerOptions) -> Self {
        let (phase_tx, phase_rx) = watch::channel(RunPhase::NotStarted);
        Self {
            options,
            tasks: Vec::new(),
            registered: HashSet::new(),
            reporters: TaskReporterRegistry::new(),
            history: None,
            phase_tx: Some(phase_tx),
            phase_rx,
            run: None,
        }
    }

    /// Add an event observer
    pub fn with_reporter(mut self, reporter: Arc<dyn TaskReporter>) -> Self {
        self.reporters.register_shared(reporter);
        self
    }

    /// Use observed durations for the critical-path analysis and record this
    /// run's durations into the same history
    pub fn with_history(mut self, history: Arc<DurationHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Register a task. A second task with an already registered id is
    /// ignored.
    pub fn add_task<T: StartupTask + 'static>(&mut self, task: T) -> Result<(), SchedulerError> {
        self.add_shared_task(Arc::new(task))
    }

    /// Register a shared task
    pub fn add_shared_task(&mut self, task: SharedTask) -> Result<(), SchedulerError> {
        if self.run.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }
        if !self.registered.insert(task.id().clone()) {
            warn!(task = %task.id(), "task already registered, ignoring");
            return Ok(());
        }
        debug!(task = %task.id(), "task registered");
        self.tasks.push(task);
        Ok(())
    }

    /// Register several tasks
    pub fn add_tasks<I>(&mut self, tasks: I) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = SharedTask>,
    {
        for task in tasks {
            self.add_shared_task(task)?;
        }
        Ok(())
    }

    /// Number of registered tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Build and analyse the task graph without running anything
    pub fn plan(&self) -> Result<ExecutionPlan, GraphError> {
        ExecutionPlan::build(&self.tasks, self.options.strategy, self.history.as_deref())
    }

    /// Start the run and block until the critical blocking tasks settled.
    /// The remaining tasks keep running in the background.
    ///
    /// Returns [`SchedulerError::Aborted`] when the starter was released by a
    /// run failure: a critical task failed, or the blocking tasks can never
    /// run because a dependency failed. A blocking task waiting only on
    /// deferred work releases the starter early without an error; its
    /// outcome shows up in [`Self::report`].
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.run.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }

        let plan = match self.plan() {
            Ok(plan) => plan,
            Err(e) => {
                self.reporters.broadcast(&TaskEvent::RunFailed {
                    error: Arc::new(RunError::Graph(e.clone())),
                });
                return Err(e.into());
            }
        };
        if plan.len() <= TREE_LOG_LIMIT {
            debug!("dependency tree:\n{}", plan.render_tree());
        }

        let phase = self.phase_tx.take().ok_or(SchedulerError::AlreadyStarted)?;
        let confined = WorkerPool::new("liftoff-confined", 1)?;
        let pooled = WorkerPool::new("liftoff-worker", self.options.pool_threads)?;

        let reporters = std::mem::replace(&mut self.reporters, TaskReporterRegistry::empty());
        let run = Run::new(
            plan,
            confined,
            pooled,
            phase,
            RunSettings {
                policy: self.options.dependency_policy,
                max_reported_failures: self.options.max_reported_failures,
                reporters: Arc::new(reporters),
                history: self.history.clone(),
            },
        );
        self.run = Some(run.clone());

        run.seed();
        run.wait_barrier();

        match run.early_failure() {
            Some(error) => Err(SchedulerError::Aborted(error)),
            None => Ok(()),
        }
    }

    /// Block until every task settled or `timeout` elapsed. Returns whether
    /// the run completed; false if it was never started.
    pub fn await_completion(&self, timeout: Duration) -> bool {
        match &self.run {
            Some(run) => run.wait_done(timeout),
            None => false,
        }
    }

    /// Wait asynchronously for the run to complete. Returns `None` if the
    /// run was never started.
    pub async fn completed(&self) -> Option<Arc<RunReport>> {
        let run = self.run.as_ref()?;
        let mut phase = self.phase_rx.clone();
        if phase.wait_for(|p| *p == RunPhase::Completed).await.is_err() && !run.is_done() {
            return None;
        }
        run.report()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> RunPhase {
        *self.phase_rx.borrow()
    }

    /// Fraction of tasks that settled
    pub fn progress(&self) -> f64 {
        match &self.run {
            Some(run) => run.tracker().progress(),
            None if self.tasks.is_empty() => 1.0,
            None => 0.0,
        }
    }

    /// State of every task in registration order
    pub fn task_states(&self) -> Vec<(TaskId, TaskState)> {
        match &self.run {
            Some(run) => run.tracker().snapshot(),
            None => self
                .tasks
                .iter()
                .map(|t| (t.id().clone(), TaskState::Pending))
                .collect(),
        }
    }

    /// Tasks currently executing
    pub fn active_task_count(&self) -> usize {
        self.run
            .as_ref()
            .map_or(0, |run| run.tracker().active_count())
    }

    /// The run's failure, once known
    pub fn failure(&self) -> Option<Arc<RunError>> {
        self.run.as_ref().and_then(|run| run.failure())
    }

    /// The plan the current run executes
    pub fn running_plan(&self) -> Option<&ExecutionPlan> {
        self.run.as_ref().map(|run| run.plan())
    }

    /// Final report, available once the run completed
    pub fn report(&self) -> Option<Arc<RunReport>> {
        self.run.as_ref().and_then(|run| run.report())
    }

    /// Wait for the run to finish and join the executor threads, bounded by
    /// the shutdown grace period. Returns false if the grace period ran out.
    pub fn shutdown(&self) -> bool {
        match &self.run {
            Some(run) => run.shutdown(self.options.shutdown_grace),
            None => true,
        }
    }
}

impl Drop for StartupScheduler {
    fn drop(&mut self) {
        if let Some(run) = &self.run {
            if !run.shutdown(self.options.shutdown_grace) {
                warn!("executors did not shut down cleanly");
            }
        }
    }
}

impl std::fmt::Debug for StartupScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupScheduler")
            .field("options", &self.options)
            .field("tasks", &self.tasks.len())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;
    use crate::task::{Affinity, TaskDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_secs(10);

    fn options() -> SchedulerOptions {
        SchedulerOptions {
            pool_threads: 4,
            shutdown_grace: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// Records the order in which task bodies ran
    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn task(&self, desc: TaskDescriptor) -> SharedTask {
            let journal = self.clone();
            let name = desc.id.to_string();
            Arc::new(desc.into_task(move || {
                journal.0.lock().unwrap().push(name.clone());
                Ok(())
            }))
        }

        fn failing(&self, desc: TaskDescriptor) -> SharedTask {
            let journal = self.clone();
            let name = desc.id.to_string();
            Arc::new(desc.into_task(move || {
                journal.0.lock().unwrap().push(name.clone());
                anyhow::bail!("{} broke", name)
            }))
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn position(&self, name: &str) -> usize {
            self.entries()
                .iter()
                .position(|n| n == name)
                .unwrap_or_else(|| panic!("{} never ran", name))
        }
    }

    fn state_of(scheduler: &StartupScheduler, name: &str) -> TaskState {
        scheduler
            .task_states()
            .into_iter()
            .find(|(id, _)| id.as_str() == name)
            .map(|(_, state)| state)
            .unwrap()
    }

    #[test]
    fn test_runs_in_dependency_order() {
        let journal = Journal::default();
        let mut scheduler = StartupScheduler::new(options());
        scheduler
            .add_tasks([
                journal.task(TaskDescriptor::new("ui").with_dependencies(["config", "theme"]).confined()),
                journal.task(TaskDescriptor::new("config").with_dependency("logging")),
                journal.task(TaskDescriptor::new("logging").confined().critical()),
                journal.task(TaskDescriptor::new("theme").with_dependency("logging")),
                journal.task(TaskDescriptor::new("net").with_cost(20)),
            ])
            .unwrap();

        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));

        assert!(journal.position("logging") < journal.position("config"));
        assert!(journal.position("logging") < journal.position("theme"));
        assert!(journal.position("config") < journal.position("ui"));
        assert!(journal.position("theme") < journal.position("ui"));

        let report = scheduler.report().unwrap();
        assert!(report.is_success());
        assert_eq!(report.succeeded, 5);
        assert!(report.pending.is_empty());
        assert_eq!(scheduler.phase(), RunPhase::Completed);
        assert_eq!(scheduler.progress(), 1.0);
    }

    #[test]
    fn test_cycle_rejected_before_execution() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = StartupScheduler::new(options());
        for (name, dep) in [("a", "b"), ("b", "c"), ("c", "a")] {
            let runs = runs.clone();
            scheduler
                .add_task(TaskDescriptor::new(name).with_dependency(dep).into_task(move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .unwrap();
        }

        let err = scheduler.start().unwrap_err();
        assert!(matches!(err, SchedulerError::Graph(GraphError::Cycle(_))));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.phase(), RunPhase::NotStarted);
    }

    #[test]
    fn test_unresolved_dependency_rejected() {
        let mut scheduler = StartupScheduler::new(options());
        scheduler
            .add_task(TaskDescriptor::new("ui").with_dependency("theme").into_task(|| Ok(())))
            .unwrap();

        let err = scheduler.start().unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Graph(GraphError::UnresolvedDependency { .. })
        ));
    }

    #[test]
    fn test_critical_failure_stops_new_work() {
        let journal = Journal::default();
        let events = Arc::new(CollectingReporter::default());
        let mut scheduler = StartupScheduler::new(options()).with_reporter(events.clone());
        scheduler
            .add_tasks([
                journal.failing(TaskDescriptor::new("db").confined().critical().with_cost(10)),
                journal.task(TaskDescriptor::new("cache").with_dependency("db")),
                journal.task(TaskDescriptor::new("ui").with_dependency("cache").confined()),
            ])
            .unwrap();

        let err = scheduler.start().unwrap_err();
        match err {
            SchedulerError::Aborted(run_err) => {
                assert_eq!(run_err.failed_task(), Some(&TaskId::new("db")));
            }
            other => panic!("expected abort, got {:?}", other),
        }
        assert!(scheduler.await_completion(WAIT));

        assert_eq!(journal.entries(), vec!["db"]);
        assert_eq!(state_of(&scheduler, "db"), TaskState::Failed);
        assert_eq!(state_of(&scheduler, "cache"), TaskState::Pending);

        let report = scheduler.report().unwrap();
        assert!(!report.is_success());
        assert!(report.error.as_deref().unwrap().contains("Critical task 'db' failed"));

        let failed_events = events
            .events()
            .iter()
            .filter(|e| matches!(e, TaskEvent::RunFailed { .. }))
            .count();
        assert_eq!(failed_events, 1);
    }

    #[test]
    fn test_queued_tasks_stay_pending_after_abort() {
        let journal = Journal::default();
        let mut scheduler = StartupScheduler::new(SchedulerOptions {
            strategy: SchedulingStrategy::Priority,
            ..options()
        });
        // Same confined thread: "first" runs and fails, the rest were queued
        // behind it and must not start.
        scheduler
            .add_tasks([
                journal.failing(TaskDescriptor::new("first").confined().critical().with_priority(10)),
                journal.task(TaskDescriptor::new("second").confined().with_priority(5)),
                journal.task(TaskDescriptor::new("third").confined().with_priority(1)),
            ])
            .unwrap();

        assert!(scheduler.start().is_err());
        assert!(scheduler.await_completion(WAIT));
        assert_eq!(journal.entries(), vec!["first"]);
        assert_eq!(state_of(&scheduler, "third"), TaskState::Pending);
    }

    #[test]
    fn test_non_critical_failure_strands_dependents() {
        let journal = Journal::default();
        let mut scheduler = StartupScheduler::new(options());
        scheduler
            .add_tasks([
                journal.failing(TaskDescriptor::new("x")),
                journal.task(TaskDescriptor::new("y").with_dependency("x")),
                journal.task(TaskDescriptor::new("z")),
            ])
            .unwrap();

        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));

        assert_eq!(state_of(&scheduler, "x"), TaskState::Failed);
        assert_eq!(state_of(&scheduler, "y"), TaskState::Pending);
        assert_eq!(state_of(&scheduler, "z"), TaskState::Success);

        let report = scheduler.report().unwrap();
        assert!(!report.is_success());
        assert_eq!(report.pending, vec![TaskId::new("y")]);
        assert!(matches!(
            scheduler.failure().as_deref(),
            Some(RunError::Deadlock { .. })
        ));
    }

    #[test]
    fn test_any_terminal_policy_runs_dependents() {
        let journal = Journal::default();
        let mut scheduler = StartupScheduler::new(SchedulerOptions {
            dependency_policy: DependencyPolicy::AnyTerminal,
            ..options()
        });
        scheduler
            .add_tasks([
                journal.failing(TaskDescriptor::new("x")),
                journal.task(TaskDescriptor::new("y").with_dependency("x")),
            ])
            .unwrap();

        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));

        assert_eq!(state_of(&scheduler, "y"), TaskState::Success);
        let report = scheduler.report().unwrap();
        assert!(report.is_success());
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.failures[0].id, TaskId::new("x"));
    }

    #[test]
    fn test_stranded_barrier_fails_start() {
        let journal = Journal::default();
        let events = Arc::new(CollectingReporter::default());
        let mut scheduler = StartupScheduler::new(options()).with_reporter(events.clone());
        scheduler
            .add_tasks([
                journal.failing(TaskDescriptor::new("theme")),
                journal.task(TaskDescriptor::new("ui").with_dependency("theme").confined().with_cost(50)),
            ])
            .unwrap();

        match scheduler.start() {
            Err(SchedulerError::Aborted(error)) => match &*error {
                RunError::Deadlock { pending } => assert_eq!(pending, &vec![TaskId::new("ui")]),
                other => panic!("expected deadlock, got {:?}", other),
            },
            other => panic!("expected stalled start, got {:?}", other),
        }
        assert!(scheduler.await_completion(WAIT));
        assert_eq!(state_of(&scheduler, "ui"), TaskState::Pending);
        assert!(scheduler.report().unwrap().barrier_wait.is_some());

        let run_failures = events
            .events()
            .iter()
            .filter(|e| matches!(e, TaskEvent::RunFailed { .. }))
            .count();
        assert_eq!(run_failures, 1);
    }

    #[test]
    fn test_blocking_task_behind_deferred_dependency() {
        let journal = Journal::default();
        let mut scheduler = StartupScheduler::new(options());
        scheduler
            .add_tasks([
                journal.task(TaskDescriptor::new("assets").deferred()),
                journal.task(TaskDescriptor::new("ui").with_dependency("assets").confined()),
            ])
            .unwrap();

        // The starter is released early, but the run still completes
        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));
        assert!(journal.position("assets") < journal.position("ui"));
        assert!(scheduler.report().unwrap().is_success());
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = StartupScheduler::new(options());
        for _ in 0..2 {
            let runs = runs.clone();
            scheduler
                .add_task(TaskDescriptor::new("logging").into_task(move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .unwrap();
        }
        assert_eq!(scheduler.task_count(), 1);

        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_many_registrations() {
        let mut scheduler = StartupScheduler::new(options());
        let tasks: Vec<SharedTask> = (0..20_000)
            .map(|i| Arc::new(TaskDescriptor::new(format!("task-{}", i % 10_000)).into_task(|| Ok(()))) as SharedTask)
            .collect();
        scheduler.add_tasks(tasks).unwrap();
        assert_eq!(scheduler.task_count(), 10_000);
    }

    #[test]
    fn test_deep_chain_runs_to_completion() {
        let depth = 50_000;
        let ran = Arc::new(AtomicUsize::new(0));
        let mut scheduler = StartupScheduler::new(options());
        for i in 0..depth {
            let ran = ran.clone();
            let desc = TaskDescriptor::new(format!("step-{}", i));
            let desc = if i == 0 {
                desc
            } else {
                desc.with_dependency(format!("step-{}", i - 1))
            };
            scheduler
                .add_task(desc.into_task(move || {
                    ran.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }))
                .unwrap();
        }

        scheduler.start().unwrap();
        assert!(scheduler.await_completion(Duration::from_secs(120)));
        assert_eq!(ran.load(Ordering::Relaxed), depth);
        assert!(scheduler.report().unwrap().is_success());
    }

    #[test]
    fn test_add_after_start_fails() {
        let mut scheduler = StartupScheduler::new(options());
        scheduler
            .add_task(TaskDescriptor::new("a").into_task(|| Ok(())))
            .unwrap();
        scheduler.start().unwrap();

        let err = scheduler
            .add_task(TaskDescriptor::new("b").into_task(|| Ok(())))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::AlreadyStarted));
        assert!(matches!(scheduler.start(), Err(SchedulerError::AlreadyStarted)));
    }

    #[test]
    fn test_confined_tasks_share_one_thread() {
        let threads = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = StartupScheduler::new(options());
        for name in ["a", "b", "c", "d"] {
            let threads = threads.clone();
            scheduler
                .add_task(TaskDescriptor::new(name).confined().into_task(move || {
                    threads
                        .lock()
                        .unwrap()
                        .push(std::thread::current().id());
                    Ok(())
                }))
                .unwrap();
        }

        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));

        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 4);
        assert!(threads.iter().all(|t| *t == threads[0]));
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[test]
    fn test_starter_waits_for_blocking_chain_only() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let mut scheduler = StartupScheduler::new(options());
        scheduler
            .add_task(TaskDescriptor::new("splash").confined().into_task(|| Ok(())))
            .unwrap();
        scheduler
            .add_task(TaskDescriptor::new("sync").into_task(move || {
                let _ = release_rx.lock().unwrap().recv_timeout(WAIT);
                Ok(())
            }))
            .unwrap();

        scheduler.start().unwrap();
        assert_eq!(state_of(&scheduler, "splash"), TaskState::Success);
        assert!(!scheduler.await_completion(Duration::from_millis(20)));

        release_tx.send(()).unwrap();
        assert!(scheduler.await_completion(WAIT));
        assert_eq!(scheduler.active_task_count(), 0);
    }

    #[test]
    fn test_deferred_tasks_wait_for_barrier() {
        let journal = Journal::default();
        let mut scheduler = StartupScheduler::new(options());
        scheduler
            .add_tasks([
                journal.task(TaskDescriptor::new("warmup").deferred().with_cost(100)),
                journal.task(TaskDescriptor::new("main").confined().with_cost(5)),
            ])
            .unwrap();

        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));
        assert!(journal.position("main") < journal.position("warmup"));
    }

    #[test]
    fn test_events_and_progress() {
        let events = Arc::new(CollectingReporter::default());
        let mut scheduler = StartupScheduler::new(options()).with_reporter(events.clone());
        scheduler
            .add_tasks([
                Arc::new(TaskDescriptor::new("a").into_task(|| Ok(()))) as SharedTask,
                Arc::new(TaskDescriptor::new("b").with_dependency("a").into_task(|| Ok(()))) as SharedTask,
            ])
            .unwrap();

        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));

        let events = events.events();
        let fractions: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Progress { fraction, .. } => Some(*fraction),
                _ => None,
            })
            .collect();
        assert_eq!(fractions, vec![0.5, 1.0]);
        assert!(events
            .iter()
            .any(|e| matches!(e, TaskEvent::RunSucceeded { .. })));
        assert!(matches!(events.last(), Some(TaskEvent::RunFinished { .. })));
    }

    #[test]
    fn test_panicking_task_is_a_failure() {
        let mut scheduler = StartupScheduler::new(options());
        scheduler
            .add_task(TaskDescriptor::new("boom").into_task(|| panic!("kaboom")))
            .unwrap();

        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));

        let report = scheduler.report().unwrap();
        assert_eq!(report.failed_count, 1);
        assert!(report.failures[0].error.as_deref().unwrap().contains("kaboom"));
    }

    #[test]
    fn test_history_records_durations() {
        let history = Arc::new(DurationHistory::new());
        let mut scheduler = StartupScheduler::new(options()).with_history(history.clone());
        scheduler
            .add_task(TaskDescriptor::new("db").into_task(|| {
                std::thread::sleep(Duration::from_millis(5));
                Ok(())
            }))
            .unwrap();

        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));
        assert!(history.get(&TaskId::new("db")).unwrap() >= 5);
    }

    #[test]
    fn test_empty_run_completes() {
        let mut scheduler = StartupScheduler::new(options());
        assert_eq!(scheduler.progress(), 1.0);
        scheduler.start().unwrap();
        assert!(scheduler.await_completion(WAIT));
        assert!(scheduler.report().unwrap().is_success());
        assert!(scheduler.shutdown());
    }

    #[test]
    fn test_states_before_start() {
        let mut scheduler = StartupScheduler::new(options());
        scheduler
            .add_task(TaskDescriptor::new("a").with_affinity(Affinity::Pooled).into_task(|| Ok(())))
            .unwrap();
        assert_eq!(scheduler.phase(), RunPhase::NotStarted);
        assert_eq!(scheduler.task_states(), vec![(TaskId::new("a"), TaskState::Pending)]);
        assert!(!scheduler.await_completion(Duration::from_millis(1)));
        assert!(scheduler.report().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_completed_future() {
        let mut scheduler = StartupScheduler::new(options());
        scheduler
            .add_task(TaskDescriptor::new("net").into_task(|| {
                std::thread::sleep(Duration::from_millis(10));
                Ok(())
            }))
            .unwrap();

        scheduler.start().unwrap();
        let report = tokio::time::timeout(WAIT, scheduler.completed())
            .await
            .unwrap()
            .unwrap();
        assert!(report.is_success());
        assert_eq!(scheduler.phase(), RunPhase::Completed);
    }

    #[test]
    fn test_options_from_config() {
        let config = SchedulerConfig {
            strategy: SchedulingStrategy::Priority,
            pool_threads: Some(3),
            shutdown_grace_secs: 7,
            ..Default::default()
        };
        let options = SchedulerOptions::from(&config);
        assert_eq!(options.strategy, SchedulingStrategy::Priority);
        assert_eq!(options.pool_threads, 3);
        assert_eq!(options.shutdown_grace, Duration::from_secs(7));
        assert!(SchedulerOptions::default().pool_threads >= 2);
    }
}
