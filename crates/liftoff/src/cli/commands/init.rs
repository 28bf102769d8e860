//! Init command

use clap::Args;
use tracing::info;

use liftoff_core::config::{default_config_toml, DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML};

use crate::cli::{output, Cli};
use crate::exit_codes;

/// Write a starter liftoff.toml
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,

    /// Write only the scheduler defaults, without sample tasks
    #[arg(long)]
    pub minimal: bool,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(force = self.force, minimal = self.minimal, "executing init command");
        let path = std::env::current_dir()?.join(DEFAULT_CONFIG_TOML);

        if path.exists() && !self.force {
            output::error(&format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            ));
            return Ok(exit_codes::CONFIG_ERROR);
        }

        let content = if self.minimal {
            default_config_toml()
        } else {
            DEFAULT_CONFIG_TEMPLATE.to_string()
        };
        std::fs::write(&path, content)?;

        if !cli.quiet {
            output::success(&format!(
                "Created {}",
                output::path_style().apply_to(path.display())
            ));
        }
        Ok(exit_codes::SUCCESS)
    }
}
