//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use liftoff_core::config::{load_config, load_config_from_dir, Config};

use commands::{InitCommand, PlanCommand, RunCommand, ValidateCommand};

/// Liftoff - run and inspect startup task plans
#[derive(Debug, Parser)]
#[command(name = "liftoff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Configuration file (default: search from the working directory up)
    #[arg(short, long, global = true, env = "LIFTOFF_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a starter liftoff.toml
    Init(InitCommand),

    /// Execute the configured startup plan with simulated tasks
    Run(RunCommand),

    /// Show the critical-path plan and dependency tree
    Plan(PlanCommand),

    /// Validate configuration and the task graph
    Validate(ValidateCommand),
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn execute(self) -> anyhow::Result<i32> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)
                .with_context(|| format!("cannot change to {}", dir.display()))?;
        }

        match self.command {
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Run(ref cmd) => cmd.execute(&self),
            Commands::Plan(ref cmd) => cmd.execute(&self),
            Commands::Validate(ref cmd) => cmd.execute(&self),
        }
    }

    /// Load the configuration named by `--config`, or search for one
    pub fn load_config(&self) -> liftoff_core::Result<(Config, PathBuf)> {
        match &self.config {
            Some(path) => Ok((load_config(path)?, path.clone())),
            None => {
                let cwd = std::env::current_dir()?;
                load_config_from_dir(&cwd)
            }
        }
    }

    /// Whether human-readable output should be printed
    pub fn show_text(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }
}
