//! Configuration types

use serde::{Deserialize, Serialize};

use crate::types::{Affinity, DependencyPolicy, SchedulingStrategy};

use super::defaults::{
    DEFAULT_COMPLETION_TIMEOUT_SECS, DEFAULT_MAX_REPORTED_FAILURES, DEFAULT_SHUTDOWN_GRACE_SECS,
};

/// Main configuration for Liftoff
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project name
    pub name: Option<String>,

    /// Scheduler tuning
    pub scheduler: SchedulerConfig,

    /// Task plan (used by the CLI to simulate a startup sequence)
    pub tasks: Vec<TaskEntry>,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Ready-queue ordering and barrier selection
    pub strategy: SchedulingStrategy,

    /// When a finished dependency releases its dependents
    pub dependency_policy: DependencyPolicy,

    /// Worker pool size (defaults to available parallelism)
    pub pool_threads: Option<usize>,

    /// Grace period for executor shutdown, in seconds
    pub shutdown_grace_secs: u64,

    /// Maximum number of failures listed in a run report
    pub max_reported_failures: usize,

    /// How long the CLI waits for full completion, in seconds
    pub completion_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: SchedulingStrategy::default(),
            dependency_policy: DependencyPolicy::default(),
            pool_threads: None,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
            max_reported_failures: DEFAULT_MAX_REPORTED_FAILURES,
            completion_timeout_secs: DEFAULT_COMPLETION_TIMEOUT_SECS,
        }
    }
}

/// A task declared in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Unique task name
    pub name: String,

    /// Tasks that must finish first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Declared priority (priority strategy)
    #[serde(default)]
    pub priority: i32,

    /// Estimated cost in milliseconds (critical-path strategy)
    #[serde(default = "default_cost_ms")]
    pub cost_ms: u64,

    /// Execution context
    #[serde(default)]
    pub affinity: Affinity,

    /// Whether a failure aborts the whole run
    #[serde(default)]
    pub critical: bool,

    /// Hold the task back until the critical barrier opens
    #[serde(default)]
    pub deferred: bool,

    /// Simulate a failing task
    #[serde(default)]
    pub fail: bool,
}

fn default_cost_ms() -> u64 {
    1
}

impl TaskEntry {
    /// Create a new entry with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            priority: 0,
            cost_ms: default_cost_ms(),
            affinity: Affinity::default(),
            critical: false,
            deferred: false,
            fail: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.tasks.is_empty());
        assert_eq!(config.scheduler.strategy, SchedulingStrategy::CriticalPath);
        assert_eq!(config.scheduler.shutdown_grace_secs, 60);
        assert_eq!(config.scheduler.max_reported_failures, 10);
        assert!(config.scheduler.pool_threads.is_none());
    }

    #[test]
    fn test_parse_toml_plan() {
        let toml_str = r#"
            name = "demo"

            [scheduler]
            strategy = "priority"
            dependency_policy = "any-terminal"
            pool_threads = 3

            [[tasks]]
            name = "logging"
            affinity = "confined"
            critical = true
            cost_ms = 20

            [[tasks]]
            name = "network"
            depends_on = ["logging"]
            priority = 5
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.name.as_deref(), Some("demo"));
        assert_eq!(config.scheduler.strategy, SchedulingStrategy::Priority);
        assert_eq!(config.scheduler.dependency_policy, DependencyPolicy::AnyTerminal);
        assert_eq!(config.scheduler.pool_threads, Some(3));
        assert_eq!(config.scheduler.shutdown_grace_secs, 60);
        assert_eq!(config.tasks.len(), 2);
        assert_eq!(config.tasks[0].affinity, Affinity::Confined);
        assert!(config.tasks[0].critical);
        assert_eq!(config.tasks[1].depends_on, vec!["logging"]);
        assert_eq!(config.tasks[1].cost_ms, 1);
        assert_eq!(config.tasks[1].affinity, Affinity::Pooled);
    }
}
