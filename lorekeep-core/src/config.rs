//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/lorekeep/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/lorekeep/` (~/.config/lorekeep/)
//! - Data: `$XDG_DATA_HOME/lorekeep/` (~/.local/share/lorekeep/)
//! - State/Logs: `$XDG_STATE_HOME/lorekeep/` (~/.local/state/lorekeep/)

use crate::error::{Error, Result};
use crate::score::ScoringWeights;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Evidence score weights and thresholds
    #[serde(default)]
    pub scoring: ScoringWeights,

    /// Promotion gating configuration
    #[serde(default)]
    pub promotion: PromotionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Promotion gating configuration
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PromotionConfig {
    /// Minimum combined evidence score for a validated learning
    #[serde(default = "default_promotion_threshold")]
    pub threshold: f64,

    /// Confidence above which review auto-promotes without prompting
    #[serde(default = "default_auto_promote_threshold")]
    pub auto_promote_threshold: f64,

    /// Minimum confidence for a candidate to be surfaced at all
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            threshold: default_promotion_threshold(),
            auto_promote_threshold: default_auto_promote_threshold(),
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_promotion_threshold() -> f64 {
    crate::evidence::DEFAULT_PROMOTION_THRESHOLD
}

fn default_auto_promote_threshold() -> f64 {
    crate::review::DEFAULT_AUTO_PROMOTE_THRESHOLD
}

fn default_min_confidence() -> f64 {
    0.3
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate threshold ranges
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("promotion.threshold", self.promotion.threshold),
            (
                "promotion.auto_promote_threshold",
                self.promotion.auto_promote_threshold,
            ),
            ("promotion.min_confidence", self.promotion.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }
        if self.logging.max_files == 0 {
            return Err(Error::Config(
                "logging.max_files must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/lorekeep/config.toml` (~/.config/lorekeep/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("lorekeep").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite store)
    ///
    /// `$XDG_DATA_HOME/lorekeep/` (~/.local/share/lorekeep/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("lorekeep")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/lorekeep/` (~/.local/state/lorekeep/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("lorekeep")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/lorekeep/data.db` (~/.local/share/lorekeep/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/lorekeep/lorekeep.log` (~/.local/state/lorekeep/lorekeep.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("lorekeep.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.promotion.threshold, 0.7);
        assert_eq!(config.promotion.auto_promote_threshold, 0.8);
        assert_eq!(config.promotion.min_confidence, 0.3);
        assert_eq!(config.scoring.test_transition, 0.7);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[scoring]
test_transition = 0.9
quality_partial_factor = 0.5

[promotion]
threshold = 0.6
auto_promote_threshold = 0.9

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.scoring.test_transition, 0.9);
        assert_eq!(config.scoring.quality_partial_factor, 0.5);
        // Unset weights keep their defaults
        assert_eq!(config.scoring.runtime_error, 0.6);
        assert_eq!(config.promotion.threshold, 0.6);
        assert_eq!(config.promotion.auto_promote_threshold, 0.9);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[promotion]\nthreshold = 0.5\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.promotion.threshold, 0.5);
        assert_eq!(config.logging.max_files, 5);
    }

    #[test]
    fn test_validate_rejects_zero_max_log_files() {
        let mut config = Config::default();
        config.logging.max_files = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_thresholds() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.promotion.threshold = 1.5;
        assert!(config.validate().is_err());

        config.promotion.threshold = -0.1;
        assert!(config.validate().is_err());
    }
}
