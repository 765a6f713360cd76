//! Configuration management for svnharvest
//!
//! Settings are read from `.harvest/config.toml` below a base directory, or
//! from an explicit file. Every field has a default, so an absent file and a
//! partial file are both valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::{HarvestError, Result};

/// Top-level svnharvest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Default repository location when none is given on the command line
    #[serde(default = "default_repository")]
    pub repository: String,

    /// How the `svn` tool is invoked
    #[serde(default)]
    pub svn: SvnConfig,

    /// Checkpoint defaults
    #[serde(default)]
    pub since: SinceConfig,

    /// Export pipeline settings
    #[serde(default)]
    pub export: ExportConfig,
}

/// Invocation settings for the external tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvnConfig {
    /// Program name or path
    #[serde(default = "default_program")]
    pub program: String,

    /// Global options placed before every subcommand, e.g. `--non-interactive`
    #[serde(default)]
    pub global_args: Vec<String>,
}

/// Checkpoint defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinceConfig {
    /// Lookback used when no checkpoint is supplied
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
}

/// Export pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Capacity of the exported-file notification channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Upper bound for `since.lookback_hours`, roughly a century
pub const MAX_LOOKBACK_HOURS: i64 = 100 * 366 * 24;

// Default value providers
fn default_repository() -> String {
    "https://svn.apache.org/repos/asf/subversion".to_string()
}

fn default_program() -> String {
    "svn".to_string()
}

fn default_lookback_hours() -> i64 {
    24
}

fn default_channel_capacity() -> usize {
    100
}

impl HarvestConfig {
    /// Load configuration from `.harvest/config.toml` or use defaults
    pub fn load_or_default(base_dir: &Path) -> Result<Self> {
        let config_path = base_dir.join(".harvest/config.toml");

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            debug!("No config at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            HarvestError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        if config.since.lookback_hours <= 0 || config.since.lookback_hours > MAX_LOOKBACK_HOURS {
            return Err(HarvestError::Config(format!(
                "since.lookback_hours must be between 1 and {}, got {}",
                MAX_LOOKBACK_HOURS, config.since.lookback_hours
            )));
        }

        if config.export.channel_capacity == 0 {
            return Err(HarvestError::Config(
                "export.channel_capacity must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }

    /// Write default configuration to `.harvest/config.toml`
    pub fn write_default(base_dir: &Path) -> Result<()> {
        let config_dir = base_dir.join(".harvest");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| HarvestError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            svn: SvnConfig::default(),
            since: SinceConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for SvnConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            global_args: Vec::new(),
        }
    }
}

impl Default for SinceConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = HarvestConfig::load_or_default(dir.path()).unwrap();

        assert_eq!(config, HarvestConfig::default());
        assert_eq!(config.svn.program, "svn");
        assert_eq!(config.since.lookback_hours, 24);
        assert_eq!(config.export.channel_capacity, 100);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".harvest")).unwrap();
        std::fs::write(
            dir.path().join(".harvest/config.toml"),
            r#"
repository = "https://svn.example.org/repos/project"

[svn]
global_args = ["--non-interactive", "--trust-server-cert"]
"#,
        )
        .unwrap();

        let config = HarvestConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.repository, "https://svn.example.org/repos/project");
        assert_eq!(
            config.svn.global_args,
            vec!["--non-interactive", "--trust-server-cert"]
        );
        assert_eq!(config.svn.program, "svn");
        assert_eq!(config.since.lookback_hours, 24);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "repository = [").unwrap();

        let err = HarvestConfig::load(&path).unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[export]\nchannel_capacity = 0\n").unwrap();

        assert!(matches!(
            HarvestConfig::load(&path),
            Err(HarvestError::Config(_))
        ));
    }

    #[test]
    fn test_lookback_hours_out_of_range_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        for value in ["0", "-24", "9000000000000000"] {
            std::fs::write(&path, format!("[since]\nlookback_hours = {}\n", value)).unwrap();
            assert!(
                matches!(HarvestConfig::load(&path), Err(HarvestError::Config(_))),
                "lookback_hours = {} should be rejected",
                value
            );
        }

        std::fs::write(&path, format!("[since]\nlookback_hours = {}\n", MAX_LOOKBACK_HOURS)).unwrap();
        assert_eq!(
            HarvestConfig::load(&path).unwrap().since.lookback_hours,
            MAX_LOOKBACK_HOURS
        );
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = TempDir::new().unwrap();
        HarvestConfig::write_default(dir.path()).unwrap();

        let config = HarvestConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, HarvestConfig::default());
    }
}
