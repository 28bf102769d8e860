//! Run command - execute the configured startup plan with simulated tasks

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use liftoff_core::{DependencyPolicy, SchedulingStrategy};
use liftoff_tasks::{
    DurationHistory, RunReport, SchedulerError, SchedulerOptions, StartupScheduler, TaskEvent,
    TaskReporter,
};

use super::load_history;
use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;
use crate::simulate;

/// Execute the configured startup plan
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Multiply every simulated task duration by this factor
    #[arg(long, default_value_t = 1.0)]
    pub time_scale: f64,

    /// Load observed durations from this file and store the new ones back
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Override the configured scheduling strategy
    #[arg(long)]
    pub strategy: Option<SchedulingStrategy>,

    /// Start dependents once their dependencies settled, even on failure
    #[arg(long)]
    pub any_terminal: bool,

    /// Worker threads in the pooled executor
    #[arg(long)]
    pub threads: Option<usize>,

    /// Seconds to wait for the whole run (default from config)
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(
            time_scale = self.time_scale,
            strategy = ?self.strategy,
            any_terminal = self.any_terminal,
            "executing run command"
        );
        let (config, config_path) = cli.load_config()?;
        if config.tasks.is_empty() {
            output::warning(&format!(
                "No tasks configured in {}",
                config_path.display()
            ));
            return Ok(exit_codes::SUCCESS);
        }

        let options = self.options(SchedulerOptions::from(&config.scheduler));
        let timeout = Duration::from_secs(
            self.timeout
                .unwrap_or(config.scheduler.completion_timeout_secs),
        );

        let history = match &self.history {
            Some(path) => Some(Arc::new(load_history(path)?)),
            None => None,
        };

        let console = cli
            .show_text()
            .then(|| Arc::new(ConsoleReporter::new(config.tasks.len(), cli.verbose)));

        let mut scheduler = StartupScheduler::new(options);
        if let Some(history) = &history {
            scheduler = scheduler.with_history(history.clone());
        }
        if let Some(console) = &console {
            scheduler = scheduler.with_reporter(console.clone());
        }
        scheduler.add_tasks(simulate::build_tasks(&config, self.time_scale))?;

        if cli.show_text() {
            output::info(&format!(
                "Starting {} ({})",
                output::plural(scheduler.task_count(), "task"),
                scheduler.options().strategy
            ));
        }

        match scheduler.start() {
            Ok(()) => {}
            Err(SchedulerError::Aborted(e)) => {
                warn!(error = %e, "startup aborted before critical tasks completed");
            }
            Err(SchedulerError::Graph(e)) => {
                output::error(&format!("Invalid task graph: {}", e));
                return Ok(exit_codes::VALIDATION_ERROR);
            }
            Err(e) => return Err(e.into()),
        }

        let runtime = tokio::runtime::Runtime::new()?;
        let report = runtime.block_on(async {
            tokio::time::timeout(timeout, scheduler.completed())
                .await
                .ok()
                .flatten()
        });

        if let Some(console) = &console {
            console.finish();
        }

        let Some(report) = report else {
            output::error(&format!(
                "Startup did not finish within {}s ({} running)",
                timeout.as_secs(),
                scheduler.active_task_count()
            ));
            return Ok(exit_codes::TIMEOUT);
        };

        if !scheduler.shutdown() {
            output::warning("Executors did not shut down within the grace period");
        }

        if let (Some(path), Some(history)) = (&self.history, &history) {
            save_history(path, history)?;
        }

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&*report)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    print_report(&report);
                }
            }
        }

        if report.is_success() {
            Ok(exit_codes::SUCCESS)
        } else {
            Ok(exit_codes::RUN_FAILED)
        }
    }

    /// Apply command-line overrides
    fn options(&self, mut options: SchedulerOptions) -> SchedulerOptions {
        if let Some(strategy) = self.strategy {
            options.strategy = strategy;
        }
        if self.any_terminal {
            options.dependency_policy = DependencyPolicy::AnyTerminal;
        }
        if let Some(threads) = self.threads {
            options.pool_threads = threads.max(1);
        }
        options
    }
}

fn save_history(path: &std::path::Path, history: &DurationHistory) -> anyhow::Result<()> {
    let json = history.to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("cannot write history {}", path.display()))?;
    info!(path = %path.display(), tasks = history.len(), "history saved");
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    if let Some(wait) = report.barrier_wait {
        println!(
            "{}",
            output::key_value("Critical tasks ready after", &output::format_duration(wait))
        );
    }
    println!(
        "{}",
        output::key_value("Total", &output::format_duration(report.total))
    );
    println!(
        "{}",
        output::key_value(
            "Started",
            &report.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
        )
    );
    println!();

    if !report.failures.is_empty() {
        println!(
            "  {} {}/{} tasks failed:",
            style("✗").red().bold(),
            report.failed_count,
            report.total_tasks
        );
        for result in &report.failures {
            println!(
                "    {} {}: {}",
                style("✗").red(),
                result.id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        if report.failed_count > report.failures.len() {
            println!(
                "    {}",
                style(format!(
                    "... and {} more",
                    report.failed_count - report.failures.len()
                ))
                .dim()
            );
        }
    }

    if !report.pending.is_empty() {
        let names: Vec<&str> = report.pending.iter().map(|id| id.as_str()).collect();
        println!(
            "  {} never started: {}",
            style("○").yellow(),
            names.join(", ")
        );
    }

    match &report.error {
        None => output::success(&format!(
            "{}/{} tasks succeeded",
            report.succeeded, report.total_tasks
        )),
        Some(error) => output::error(error),
    }
}

/// Progress bar plus per-task lines
struct ConsoleReporter {
    bar: ProgressBar,
    verbose: bool,
}

impl ConsoleReporter {
    fn new(total: usize, verbose: bool) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, verbose }
    }

    fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id, .. } => {
                self.bar.set_message(id.to_string());
            }
            TaskEvent::Completed { id, duration } => {
                if self.verbose {
                    self.bar.println(format!(
                        "  {} {} {}",
                        style("✓").green(),
                        style(id).green(),
                        style(output::format_duration(*duration)).dim()
                    ));
                }
            }
            TaskEvent::Failed {
                id,
                duration,
                error,
                critical,
            } => {
                self.bar.println(format!(
                    "  {} {}{} {} {}",
                    style("✗").red(),
                    style(id).red(),
                    if *critical { " (critical)" } else { "" },
                    style(output::format_duration(*duration)).dim(),
                    style(error).red().dim()
                ));
            }
            TaskEvent::Progress { settled, .. } => {
                self.bar.set_position(*settled as u64);
            }
            TaskEvent::BarrierReleased { elapsed, early } => {
                let line = if *early {
                    format!(
                        "  {} startup released early after {}",
                        style("!").yellow(),
                        output::format_duration(*elapsed)
                    )
                } else {
                    format!(
                        "  {} critical tasks ready after {}",
                        style("●").yellow(),
                        output::format_duration(*elapsed)
                    )
                };
                self.bar.println(line);
            }
            TaskEvent::RunFailed { error } => {
                self.bar
                    .println(format!("  {} {}", style("✗").red().bold(), error));
            }
            TaskEvent::RunSucceeded { .. } => {}
            TaskEvent::RunFinished { .. } => {
                self.bar.finish_and_clear();
            }
        }
    }
}
