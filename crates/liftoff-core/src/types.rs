//! Core types for Liftoff

use serde::{Deserialize, Serialize};

/// Execution context a task must run on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    /// Single designated thread, jobs run one at a time
    Confined,
    /// Shared worker pool
    #[default]
    Pooled,
}

impl Affinity {
    /// Returns the string representation of the affinity
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confined => "confined",
            Self::Pooled => "pooled",
        }
    }
}

impl std::fmt::Display for Affinity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Affinity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "confined" | "main" | "blocking" => Ok(Self::Confined),
            "pooled" | "pool" | "background" => Ok(Self::Pooled),
            _ => Err(format!("Unknown affinity: {}", s)),
        }
    }
}

/// How ready tasks are ordered and which tasks the starter waits for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingStrategy {
    /// Order by critical-path weight; wait for the longest confined chain
    #[default]
    CriticalPath,
    /// Order by declared priority; wait for every confined task
    Priority,
}

impl SchedulingStrategy {
    /// Returns the string representation of the strategy
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriticalPath => "critical-path",
            Self::Priority => "priority",
        }
    }
}

impl std::fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SchedulingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical-path" | "critical_path" | "cpm" => Ok(Self::CriticalPath),
            "priority" => Ok(Self::Priority),
            _ => Err(format!("Unknown scheduling strategy: {}", s)),
        }
    }
}

/// When a finished dependency counts as satisfied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyPolicy {
    /// Only a successful dependency releases its dependents. A failed
    /// non-critical task strands everything downstream of it.
    #[default]
    RequireSuccess,
    /// Any terminal state releases dependents.
    AnyTerminal,
}

impl DependencyPolicy {
    /// Returns the string representation of the policy
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequireSuccess => "require-success",
            Self::AnyTerminal => "any-terminal",
        }
    }
}

impl std::fmt::Display for DependencyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
