//! Validate command

use std::collections::HashSet;

use clap::Args;
use console::style;
use tracing::info;

use liftoff_core::config::Config;
use liftoff_tasks::ExecutionPlan;

use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;
use crate::simulate;

/// Validate configuration and the task graph
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Only validate the configuration file, skip graph checks
    #[arg(long)]
    pub config_only: bool,

    /// Strict mode - treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(
            config_only = self.config_only,
            strict = self.strict,
            "executing validate command"
        );

        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        let (config, config_path) = match cli.load_config() {
            Ok((c, p)) => (Some(c), Some(p)),
            Err(e) => {
                errors.push(format!("Configuration: {}", e));
                (None, None)
            }
        };

        if let Some(ref cfg) = config {
            if !self.config_only {
                check_graph(cfg, &mut errors, &mut warnings);
            }
        }

        // If strict, promote warnings to errors
        if self.strict {
            errors.append(&mut warnings);
        }

        let passed = errors.is_empty();

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "valid": passed,
                    "config_path": config_path.map(|p| p.to_string_lossy().to_string()),
                    "errors": errors,
                    "warnings": warnings
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!("{}", style("Validation Results").bold());
                    println!();

                    if let Some(path) = config_path {
                        println!("Config: {}", style(path.display()).cyan());
                        println!();
                    }

                    if !errors.is_empty() {
                        println!("{}", style("Errors:").red().bold());
                        for error in &errors {
                            println!("  {} {}", style("✗").red(), error);
                        }
                        println!();
                    }

                    if !warnings.is_empty() {
                        println!("{}", style("Warnings:").yellow().bold());
                        for warning in &warnings {
                            println!("  {} {}", style("!").yellow(), warning);
                        }
                        println!();
                    }

                    if passed {
                        if warnings.is_empty() {
                            println!("{}", style("✓ All checks passed").green().bold());
                        } else {
                            println!(
                                "{} with {} warning(s)",
                                style("✓ Validation passed").green().bold(),
                                warnings.len()
                            );
                        }
                    } else {
                        println!(
                            "{} with {} error(s)",
                            style("✗ Validation failed").red().bold(),
                            errors.len()
                        );
                    }
                }
            }
        }

        if passed {
            Ok(exit_codes::SUCCESS)
        } else {
            Ok(exit_codes::VALIDATION_ERROR)
        }
    }
}

/// Graph-level checks on the configured tasks
fn check_graph(config: &Config, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    if config.tasks.is_empty() {
        warnings.push("No tasks configured".to_string());
        return;
    }

    let mut seen = HashSet::new();
    for entry in &config.tasks {
        if !seen.insert(entry.name.as_str()) {
            warnings.push(format!(
                "Task '{}' is declared more than once; only the first is used",
                entry.name
            ));
        }
        if entry.critical && entry.deferred {
            warnings.push(format!(
                "Critical task '{}' is deferred; its failure is only seen after startup",
                entry.name
            ));
        }
    }

    let tasks = simulate::build_tasks(config, 0.0);
    match ExecutionPlan::build(&tasks, config.scheduler.strategy, None) {
        Ok(plan) => {
            if plan.barrier_count() == 0 {
                warnings.push("No confined tasks: startup will not wait for any task".to_string());
            }
        }
        Err(e) => errors.push(format!("Task graph: {}", e)),
    }
}
