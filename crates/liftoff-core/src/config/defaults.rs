//! Default configuration values

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "liftoff.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "liftoff.yaml";

/// Executor shutdown grace period in seconds
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 60;

/// Failures listed in a run report
pub const DEFAULT_MAX_REPORTED_FAILURES: usize = 10;

/// How long the CLI waits for a run to complete
pub const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 300;

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".liftoff.toml",
        ".liftoff.yaml",
    ]
}

/// Generate default configuration TOML
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Liftoff Configuration

[scheduler]
strategy = "critical-path"
dependency_policy = "require-success"
shutdown_grace_secs = 60
max_reported_failures = 10
completion_timeout_secs = 300

[[tasks]]
name = "logging"
affinity = "confined"
critical = true
cost_ms = 10

[[tasks]]
name = "database"
depends_on = ["logging"]
cost_ms = 40
"#;
