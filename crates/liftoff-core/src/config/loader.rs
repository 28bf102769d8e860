//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    let format = if path.extension().is_some_and(|e| e == "toml") {
        "TOML"
    } else {
        "YAML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: Config = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(path = %path.display(), tasks = config.tasks.len(), "config loaded and validated");
    Ok(config)
}

/// Find configuration file in directory or parent directories.
///
/// At each directory level the search checks:
///   1. `<dir>/<name>`          (e.g. `liftoff.toml`)
///   2. `<dir>/.config/<name>`  (e.g. `.config/liftoff.toml`)
///
/// The first match wins. Parents are walked until the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }

            let nested_path = current.join(".config").join(name);
            if nested_path.exists() {
                info!(path = %nested_path.display(), "found config file in .config/");
                return Some(nested_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

/// Load configuration or use defaults
pub fn load_config_or_default(dir: &Path) -> (Config, Option<PathBuf>) {
    match load_config_from_dir(dir) {
        Ok((config, path)) => (config, Some(path)),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "no usable config found, using defaults");
            (Config::default(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Affinity, SchedulingStrategy};
    use tempfile::TempDir;

    #[test]
    fn test_find_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("liftoff.toml");
        std::fs::write(&config_path, "[scheduler]\nstrategy = \"priority\"").unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_prefers_toml_over_yaml() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join("liftoff.toml");
        let yaml_path = temp.path().join("liftoff.yaml");
        std::fs::write(&toml_path, "[scheduler]\nstrategy = \"priority\"").unwrap();
        std::fs::write(&yaml_path, "scheduler:\n  strategy: priority").unwrap();

        let found = find_config(temp.path()).unwrap();
        assert_eq!(found, toml_path);
    }

    #[test]
    fn test_find_config_in_dot_config_dir() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join(".config");
        std::fs::create_dir_all(&nested).unwrap();
        let config_path = nested.join("liftoff.toml");
        std::fs::write(&config_path, "").unwrap();

        assert_eq!(find_config(temp.path()), Some(config_path));
    }

    #[test]
    fn test_find_config_walks_parents() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("liftoff.toml");
        std::fs::write(&config_path, "").unwrap();
        let child = temp.path().join("app").join("src");
        std::fs::create_dir_all(&child).unwrap();

        assert_eq!(find_config(&child), Some(config_path));
    }

    #[test]
    fn test_load_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("liftoff.toml");
        std::fs::write(
            &config_path,
            "[scheduler]\nstrategy = \"priority\"\n\n[[tasks]]\nname = \"ui\"\naffinity = \"confined\"\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.scheduler.strategy, SchedulingStrategy::Priority);
        assert_eq!(config.tasks[0].affinity, Affinity::Confined);
    }

    #[test]
    fn test_load_config_yaml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("liftoff.yaml");
        std::fs::write(
            &config_path,
            "scheduler:\n  pool_threads: 2\ntasks:\n  - name: db\n    cost_ms: 30\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.scheduler.pool_threads, Some(2));
        assert_eq!(config.tasks[0].cost_ms, 30);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("liftoff.toml");
        std::fs::write(&config_path, "[scheduler]\npool_threads = 0\n").unwrap();

        assert!(load_config(&config_path).is_err());
    }

    #[test]
    fn test_load_config_or_default_without_file() {
        let temp = TempDir::new().unwrap();
        let (config, path) = load_config_or_default(temp.path());
        assert!(path.is_none());
        assert!(config.tasks.is_empty());
    }
}
