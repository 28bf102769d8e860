//! CLI commands

mod init;
mod plan;
mod run;
mod validate;

pub use init::InitCommand;
pub use plan::PlanCommand;
pub use run::RunCommand;
pub use validate::ValidateCommand;

use std::path::Path;

use anyhow::Context;
use liftoff_tasks::DurationHistory;

/// Load a duration history file; a missing file yields an empty history
pub(crate) fn load_history(path: &Path) -> anyhow::Result<DurationHistory> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no history file yet");
        return Ok(DurationHistory::new());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read history {}", path.display()))?;
    DurationHistory::from_json(&json)
        .with_context(|| format!("invalid history file {}", path.display()))
}
