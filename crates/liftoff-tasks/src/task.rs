//! Task types and definitions

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use liftoff_core::Affinity;

/// Unique identifier for a startup task
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new task ID
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The task name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TaskId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Immutable description of one unit of startup work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Task identifier
    pub id: TaskId,

    /// Tasks that must finish before this one starts
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    /// Declared priority, higher runs first (priority strategy)
    #[serde(default)]
    pub priority: i32,

    /// Estimated cost in milliseconds (critical-path strategy)
    #[serde(default = "default_cost")]
    pub estimated_cost: u64,

    /// Execution context
    #[serde(default)]
    pub affinity: Affinity,

    /// Whether a failure aborts the whole run
    #[serde(default)]
    pub critical: bool,

    /// Hold back until the critical barrier opens
    #[serde(default)]
    pub deferred: bool,
}

fn default_cost() -> u64 {
    1
}

impl TaskDescriptor {
    /// Create a new pooled, non-critical descriptor with unit cost
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            priority: 0,
            estimated_cost: default_cost(),
            affinity: Affinity::Pooled,
            critical: false,
            deferred: false,
        }
    }

    /// Add a dependency
    pub fn with_dependency(mut self, dep: impl Into<TaskId>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// Add several dependencies
    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Set the declared priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the estimated cost in milliseconds
    pub fn with_cost(mut self, cost: u64) -> Self {
        self.estimated_cost = cost;
        self
    }

    /// Set the execution affinity
    pub fn with_affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }

    /// Run on the confined executor
    pub fn confined(self) -> Self {
        self.with_affinity(Affinity::Confined)
    }

    /// Mark the task critical: its failure aborts the run
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Hold the task back until the critical barrier opens
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Attach a body, producing a runnable task
    pub fn into_task<F>(self, body: F) -> ClosureTask
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        ClosureTask {
            descriptor: self,
            body: Box::new(body),
        }
    }
}

/// A unit of startup work the scheduler runs exactly once
pub trait StartupTask: Send + Sync {
    /// Static description of the task
    fn descriptor(&self) -> &TaskDescriptor;

    /// Run the task body
    fn execute(&self) -> anyhow::Result<()>;

    fn id(&self) -> &TaskId {
        &self.descriptor().id
    }

    fn dependencies(&self) -> &[TaskId] {
        &self.descriptor().dependencies
    }

    fn priority(&self) -> i32 {
        self.descriptor().priority
    }

    fn estimated_cost(&self) -> u64 {
        self.descriptor().estimated_cost
    }

    fn affinity(&self) -> Affinity {
        self.descriptor().affinity
    }

    fn is_confined(&self) -> bool {
        self.affinity() == Affinity::Confined
    }

    fn is_critical(&self) -> bool {
        self.descriptor().critical
    }

    fn is_deferred(&self) -> bool {
        self.descriptor().deferred
    }
}

type TaskBody = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Task whose body is a closure
pub struct ClosureTask {
    descriptor: TaskDescriptor,
    body: TaskBody,
}

impl fmt::Debug for ClosureTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureTask")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl StartupTask for ClosureTask {
    fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    fn execute(&self) -> anyhow::Result<()> {
        (self.body)()
    }
}

/// Shared handle to a registered task
pub type SharedTask = Arc<dyn StartupTask>;
