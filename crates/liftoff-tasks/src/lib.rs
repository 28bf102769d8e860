//! Liftoff Tasks - startup task scheduler
//!
//! This crate runs a fixed set of initialization tasks exactly once in
//! dependency order. Ready tasks are ordered by their critical-path weight
//! (or declared priority), split between a single confined thread and a
//! worker pool, and the caller blocks only until the critical blocking tasks
//! have finished.

pub mod critical_path;
pub mod dag;
mod dispatcher;
pub mod error;
pub mod executor;
pub mod history;
pub mod latch;
pub mod plan;
pub mod reporter;
pub mod scheduler;
pub mod task;
pub mod tracker;

pub use critical_path::CriticalPath;
pub use dag::{GraphError, TaskGraph, TaskNode};
pub use error::{RunError, SchedulerError, TaskFailure};
pub use executor::{ExecutorError, WorkerPool};
pub use history::DurationHistory;
pub use latch::CountDownLatch;
pub use plan::{ExecutionPlan, PlanSummary, PlannedTask, TaskListing, TaskStatistics};
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter};
pub use scheduler::{RunPhase, SchedulerOptions, StartupScheduler};
pub use task::{Affinity, ClosureTask, SharedTask, StartupTask, TaskDescriptor, TaskId};
pub use tracker::{RunReport, StateTracker, TaskResult, TaskState};

pub use liftoff_core::{DependencyPolicy, SchedulingStrategy};
