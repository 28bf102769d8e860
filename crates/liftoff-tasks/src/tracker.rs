//! Per-task lifecycle state and run results

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::task::TaskId;

/// Lifecycle state of a task. Pending is initial, Success and Failed are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Running = 1,
    Success = 2,
    Failed = 3,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Success,
            3 => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Whether the state is final
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single finished task
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    /// Task that was executed
    pub id: TaskId,
    /// Terminal state
    pub state: TaskState,
    /// How long the task body ran
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Failure message, if the task failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The captured failure itself
    #[serde(skip)]
    pub cause: Option<Arc<anyhow::Error>>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.state == TaskState::Success
    }
}

/// Immutable summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Wall-clock time the run started
    pub started_at: DateTime<Utc>,
    /// Time from start until every task was settled
    #[serde(rename = "total_ms", serialize_with = "serialize_millis")]
    pub total: Duration,
    /// Time until the critical blocking tasks completed
    #[serde(rename = "barrier_wait_ms", serialize_with = "serialize_opt_millis")]
    pub barrier_wait: Option<Duration>,
    /// Whether the run succeeded
    pub success: bool,
    /// Why the run failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of registered tasks
    pub total_tasks: usize,
    /// Tasks that reached Success
    pub succeeded: usize,
    /// Tasks that reached Failed
    pub failed_count: usize,
    /// Results of every terminal task, in registration order
    pub results: Vec<TaskResult>,
    /// The first failures, bounded by the configured limit
    pub failures: Vec<TaskResult>,
    /// Tasks that never ran
    pub pending: Vec<TaskId>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Result for one task
    pub fn result(&self, id: &TaskId) -> Option<&TaskResult> {
        self.results.iter().find(|r| &r.id == id)
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

fn serialize_opt_millis<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serialize_millis(d, serializer),
        None => serializer.serialize_none(),
    }
}

/// Lock-free state slots, one per graph node
#[derive(Debug)]
pub struct StateTracker {
    ids: Vec<TaskId>,
    states: Vec<AtomicU8>,
    results: Vec<OnceLock<TaskResult>>,
    settled: AtomicUsize,
    running: AtomicUsize,
    failed: AtomicUsize,
}

impl StateTracker {
    /// Create a tracker with every task Pending
    pub fn new(ids: Vec<TaskId>) -> Self {
        let len = ids.len();
        Self {
            ids,
            states: (0..len).map(|_| AtomicU8::new(TaskState::Pending as u8)).collect(),
            results: (0..len).map(|_| OnceLock::new()).collect(),
            settled: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Move a task from Pending to Running. Returns false if it already left
    /// Pending.
    pub fn begin(&self, idx: usize) -> bool {
        let moved = self.states[idx]
            .compare_exchange(
                TaskState::Pending as u8,
                TaskState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if moved {
            self.running.fetch_add(1, Ordering::AcqRel);
        }
        moved
    }

    /// Record the terminal state of a running task and return the new
    /// completion fraction.
    pub fn finish(&self, idx: usize, cause: Option<Arc<anyhow::Error>>, duration: Duration) -> f64 {
        let state = if cause.is_some() {
            TaskState::Failed
        } else {
            TaskState::Success
        };

        let result = TaskResult {
            id: self.ids[idx].clone(),
            state,
            duration,
            error: cause.as_ref().map(|e| format!("{:#}", e)),
            cause,
        };
        if self.results[idx].set(result).is_err() {
            tracing::warn!(task = %self.ids[idx], "task finished twice, keeping first result");
            return self.progress();
        }

        self.states[idx].store(state as u8, Ordering::Release);
        if state == TaskState::Failed {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }
        self.running.fetch_sub(1, Ordering::AcqRel);
        self.settled.fetch_add(1, Ordering::AcqRel);
        self.progress()
    }

    /// Current state of one task
    pub fn state(&self, idx: usize) -> TaskState {
        TaskState::from_u8(self.states[idx].load(Ordering::Acquire))
    }

    /// Fraction of tasks in a terminal state (1.0 when there are none)
    pub fn progress(&self) -> f64 {
        if self.ids.is_empty() {
            return 1.0;
        }
        self.settled() as f64 / self.ids.len() as f64
    }

    /// Number of terminal tasks
    pub fn settled(&self) -> usize {
        self.settled.load(Ordering::Acquire)
    }

    /// Number of tasks
    pub fn total(&self) -> usize {
        self.ids.len()
    }

    /// Tasks currently executing
    pub fn active_count(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Failed tasks so far
    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::Acquire)
    }

    /// State of every task in registration order
    pub fn snapshot(&self) -> Vec<(TaskId, TaskState)> {
        self.ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), self.state(idx)))
            .collect()
    }

    /// Tasks still Pending
    pub fn pending(&self) -> Vec<TaskId> {
        self.ids
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.state(*idx) == TaskState::Pending)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Results recorded so far, in registration order
    pub fn results(&self) -> Vec<TaskResult> {
        self.results.iter().filter_map(|r| r.get().cloned()).collect()
    }

    /// Build the final report
    pub fn report(
        &self,
        started_at: DateTime<Utc>,
        total: Duration,
        barrier_wait: Option<Duration>,
        error: Option<String>,
        max_failures: usize,
    ) -> RunReport {
        let results = self.results();
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed: Vec<&TaskResult> = results.iter().filter(|r| !r.is_success()).collect();
        let failed_count = failed.len();
        let failures = failed.into_iter().take(max_failures).cloned().collect();

        RunReport {
            started_at,
            total,
            barrier_wait,
            success: error.is_none(),
            error,
            total_tasks: self.ids.len(),
            succeeded,
            failed_count,
            results,
            failures,
            pending: self.pending(),
        }
    }
}
