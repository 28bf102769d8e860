//! Run event reporting

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::RunError;
use crate::task::{Affinity, TaskId};
use crate::tracker::RunReport;

/// Events emitted during a run
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A task started executing
    Started {
        id: TaskId,
        affinity: Affinity,
        key: i64,
    },
    /// A task completed successfully
    Completed { id: TaskId, duration: Duration },
    /// A task failed
    Failed {
        id: TaskId,
        duration: Duration,
        error: String,
        critical: bool,
    },
    /// Completion fraction after a task settled
    Progress {
        settled: usize,
        total: usize,
        fraction: f64,
    },
    /// The starter thread was released
    BarrierReleased {
        elapsed: Duration,
        /// Released before every critical blocking task settled
        early: bool,
    },
    /// Every task settled and no critical task failed
    RunSucceeded { duration: Duration },
    /// The run failed. Sent at the moment the failure is known.
    RunFailed { error: Arc<RunError> },
    /// The run is over; always the last event
    RunFinished { report: Arc<RunReport> },
}

/// Trait for observing a run
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id, affinity, key } => {
                tracing::debug!(task = %id, %affinity, key, "task started");
            }
            TaskEvent::Completed { id, duration } => {
                tracing::debug!("{} completed in {}ms", id, duration.as_millis());
            }
            TaskEvent::Failed {
                id,
                duration,
                error,
                critical,
            } => {
                if *critical {
                    tracing::error!("critical task {} failed after {}ms: {}", id, duration.as_millis(), error);
                } else {
                    tracing::warn!("{} failed after {}ms: {}", id, duration.as_millis(), error);
                }
            }
            TaskEvent::Progress { settled, total, .. } => {
                tracing::trace!(settled, total, "progress");
            }
            TaskEvent::BarrierReleased { elapsed, early } => {
                if *early {
                    tracing::warn!("starter released early after {}ms", elapsed.as_millis());
                } else {
                    tracing::info!("critical tasks completed in {}ms", elapsed.as_millis());
                }
            }
            TaskEvent::RunSucceeded { duration } => {
                tracing::info!("all tasks completed in {}ms", duration.as_millis());
            }
            TaskEvent::RunFailed { error } => {
                tracing::error!("startup failed: {}", error);
            }
            TaskEvent::RunFinished { report } => {
                tracing::info!(
                    "run finished: {}/{} succeeded, {} failed, {} pending ({}ms)",
                    report.succeeded,
                    report.total_tasks,
                    report.failed_count,
                    report.pending.len(),
                    report.total.as_millis()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Registry of task reporters
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    /// Register a reporter the caller keeps a handle to
    pub fn register_shared(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }

    /// Broadcast an event to all registered reporters
    pub fn broadcast(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskReporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskReporterRegistry")
            .field("reporters", &self.reporters.len())
            .finish()
    }
}
