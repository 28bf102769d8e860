//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_scheduler(config)?;
    validate_tasks(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<()> {
    let scheduler = &config.scheduler;

    if scheduler.pool_threads == Some(0) {
        return Err(ConfigError::invalid(
            "scheduler.pool_threads",
            "must be greater than 0",
        )
        .into());
    }

    if scheduler.shutdown_grace_secs == 0 {
        return Err(ConfigError::invalid(
            "scheduler.shutdown_grace_secs",
            "must be greater than 0",
        )
        .into());
    }

    if scheduler.max_reported_failures == 0 {
        return Err(ConfigError::invalid(
            "scheduler.max_reported_failures",
            "must be greater than 0",
        )
        .into());
    }

    if scheduler.completion_timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "scheduler.completion_timeout_secs",
            "must be greater than 0",
        )
        .into());
    }

    Ok(())
}

// Unknown dependencies and cycles are graph errors, reported when the plan
// is built.
fn validate_tasks(config: &Config) -> Result<()> {
    for (i, task) in config.tasks.iter().enumerate() {
        if task.name.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("tasks[{}].name", i),
                "task name cannot be empty",
            )
            .into());
        }

        if task.depends_on.iter().any(|dep| dep == &task.name) {
            return Err(ConfigError::invalid(
                format!("tasks[{}].depends_on", i),
                format!("task '{}' cannot depend on itself", task.name),
            )
            .into());
        }
    }

    Ok(())
}
