//! Simulated startup tasks built from the `[[tasks]]` config section.
//!
//! Each task sleeps for its declared cost (scaled by `time_scale`) and fails
//! when the entry sets `fail = true`.

use std::sync::Arc;
use std::time::Duration;

use liftoff_core::config::{Config, TaskEntry};
use liftoff_tasks::{SharedTask, StartupTask, TaskDescriptor};

/// A task whose body only sleeps
#[derive(Debug)]
pub struct SimulatedTask {
    descriptor: TaskDescriptor,
    sleep: Duration,
    fail: bool,
}

impl SimulatedTask {
    pub fn from_entry(entry: &TaskEntry, time_scale: f64) -> Self {
        let descriptor = TaskDescriptor::new(entry.name.as_str())
            .with_dependencies(entry.depends_on.iter().map(String::as_str))
            .with_priority(entry.priority)
            .with_cost(entry.cost_ms)
            .with_affinity(entry.affinity);
        let descriptor = if entry.critical {
            descriptor.critical()
        } else {
            descriptor
        };
        let descriptor = if entry.deferred {
            descriptor.deferred()
        } else {
            descriptor
        };

        let scaled = (entry.cost_ms as f64 * time_scale.max(0.0)).round() as u64;
        Self {
            descriptor,
            sleep: Duration::from_millis(scaled),
            fail: entry.fail,
        }
    }

    pub fn sleep(&self) -> Duration {
        self.sleep
    }
}

impl StartupTask for SimulatedTask {
    fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    fn execute(&self) -> anyhow::Result<()> {
        if !self.sleep.is_zero() {
            std::thread::sleep(self.sleep);
        }
        if self.fail {
            anyhow::bail!("simulated failure in '{}'", self.descriptor.id);
        }
        Ok(())
    }
}

/// Build one simulated task per config entry
pub fn build_tasks(config: &Config, time_scale: f64) -> Vec<SharedTask> {
    config
        .tasks
        .iter()
        .map(|entry| Arc::new(SimulatedTask::from_entry(entry, time_scale)) as SharedTask)
        .collect()
}
