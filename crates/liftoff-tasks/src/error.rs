//! Scheduler and run errors

use std::fmt;
use std::sync::Arc;

use crate::dag::GraphError;
use crate::executor::ExecutorError;
use crate::task::TaskId;

/// Why a run failed
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The task graph was rejected before anything ran
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A critical task failed; nothing new was started afterwards
    #[error("Critical task '{task}' failed ({failed} tasks failed so far): {cause}")]
    CriticalTaskFailed {
        task: TaskId,
        failed: usize,
        #[source]
        cause: TaskFailure,
    },

    /// Nothing is in flight but some tasks never became ready
    #[error("Initialization deadlock detected. Pending tasks: {}", join_ids(.pending))]
    Deadlock { pending: Vec<TaskId> },
}

impl RunError {
    /// Task whose failure aborted the run, if any
    pub fn failed_task(&self) -> Option<&TaskId> {
        match self {
            Self::CriticalTaskFailed { task, .. } => Some(task),
            _ => None,
        }
    }
}

/// Error returned by a task body, shared between the run failure and the
/// task's own result. Its source is the next error in the task's chain.
#[derive(Debug, Clone)]
pub struct TaskFailure(Arc<anyhow::Error>);

impl TaskFailure {
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<Arc<anyhow::Error>> for TaskFailure {
    fn from(error: Arc<anyhow::Error>) -> Self {
        Self(error)
    }
}

impl From<anyhow::Error> for TaskFailure {
    fn from(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let inner: &(dyn std::error::Error + 'static) = &**self.0;
        inner.source()
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors returned by [`crate::StartupScheduler`]
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Tasks were added or the run started after scheduling began
    #[error("Scheduler already started")]
    AlreadyStarted,

    /// Task graph is invalid
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Execution pools could not be created
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// The run failed before the critical tasks completed
    #[error("Startup aborted: {0}")]
    Aborted(Arc<RunError>),
}
