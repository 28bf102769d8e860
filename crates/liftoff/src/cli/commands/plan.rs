//! Plan command - show how a startup plan would be scheduled

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use liftoff_core::SchedulingStrategy;
use liftoff_tasks::{ExecutionPlan, PlannedTask, SchedulerOptions, StartupScheduler};

use super::load_history;
use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;
use crate::simulate;

/// Show the critical-path plan and dependency tree
#[derive(Debug, Args)]
pub struct PlanCommand {
    /// Override the configured scheduling strategy
    #[arg(long)]
    pub strategy: Option<SchedulingStrategy>,

    /// Use observed durations from a history file
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Only print the dependency tree
    #[arg(long)]
    pub tree: bool,
}

impl PlanCommand {
    /// Execute the plan command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(strategy = ?self.strategy, tree = self.tree, "executing plan command");
        let (config, _) = cli.load_config()?;

        let mut options = SchedulerOptions::from(&config.scheduler);
        if let Some(strategy) = self.strategy {
            options.strategy = strategy;
        }

        let mut scheduler = StartupScheduler::new(options);
        if let Some(path) = &self.history {
            scheduler = scheduler.with_history(std::sync::Arc::new(load_history(path)?));
        }
        scheduler.add_tasks(simulate::build_tasks(&config, 0.0))?;

        let plan = match scheduler.plan() {
            Ok(plan) => plan,
            Err(e) => {
                output::error(&format!("Invalid task graph: {}", e));
                return Ok(exit_codes::VALIDATION_ERROR);
            }
        };

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "plan": plan.summary(),
                    "listing": plan.listing(),
                    "tree": plan.render_tree(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text if self.tree => print!("{}", plan.render_tree()),
            OutputFormat::Text => {
                if !cli.quiet {
                    print_plan(&plan, cli.verbose);
                }
            }
        }

        Ok(exit_codes::SUCCESS)
    }
}

fn print_plan(plan: &ExecutionPlan, verbose: bool) {
    let stats = plan.statistics();
    println!(
        "{} ({}, {})",
        output::header("Startup plan"),
        plan.strategy(),
        output::plural(stats.total, "task")
    );
    println!();

    let chain = plan.longest_chain();
    if !chain.is_empty() {
        let names: Vec<&str> = chain.iter().map(|id| id.as_str()).collect();
        println!("{}", output::key_value("Longest chain", &names.join(" → ")));
    }
    println!(
        "{}",
        output::key_value(
            "Critical chain length",
            &plan.critical_path().chain_length().to_string()
        )
    );
    let blocking: Vec<String> = plan
        .barrier_tasks()
        .iter()
        .map(|id| output::task_style().apply_to(id).to_string())
        .collect();
    println!(
        "{}",
        output::key_value(
            "Startup waits for",
            &if blocking.is_empty() {
                style("nothing").dim().to_string()
            } else {
                blocking.join(", ")
            }
        )
    );
    println!();

    println!("{}", output::header("Dependency tree"));
    for line in plan.render_tree().lines() {
        println!("  {}", line);
    }
    println!();

    let listing = plan.listing();
    for (title, group) in [
        ("Critical", &listing.critical),
        ("Normal", &listing.normal),
        ("Deferred", &listing.deferred),
    ] {
        if group.is_empty() {
            continue;
        }
        println!("{}", output::header(title));
        for task in group {
            print_task(task, verbose);
        }
        println!();
    }

    println!(
        "{} {} confined, {} pooled, {} critical, {} deferred",
        style("→").blue(),
        stats.confined,
        stats.pooled,
        stats.critical,
        stats.deferred
    );
}

fn print_task(task: &PlannedTask, verbose: bool) {
    let marker = if task.barrier {
        style("●").yellow().to_string()
    } else {
        style("○").dim().to_string()
    };
    println!(
        "  {} {} {}",
        marker,
        output::task_style().apply_to(&task.id),
        style(format!("[{}, key {}]", task.affinity, task.key)).dim()
    );
    if verbose && !task.dependencies.is_empty() {
        let deps: Vec<&str> = task.dependencies.iter().map(|d| d.as_str()).collect();
        println!("      {}", style(format!("after {}", deps.join(", "))).dim());
    }
}
