//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/claude-deck/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/claude-deck/` (~/.config/claude-deck/)
//! - Data: `$XDG_DATA_HOME/claude-deck/` (~/.local/share/claude-deck/)
//! - State/Logs: `$XDG_STATE_HOME/claude-deck/` (~/.local/state/claude-deck/)

use crate::error::{Error, Result};
use crate::pricing::{ModelPricing, DEFAULT_MODEL};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "claude-deck";

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
    /// Where to find agent logs
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Price table overrides
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Report settings
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Log source locations
#[derive(Debug, Deserialize, Default)]
pub struct SourcesConfig {
    /// Override for the agent data root (defaults to `~/.claude`)
    pub claude_dir: Option<PathBuf>,
}

/// Pricing overrides layered over the built-in table
#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    /// Model billed when an id has no price
    #[serde(default = "default_pricing_model")]
    pub default_model: String,

    /// Extra or replacement prices, keyed by model id
    #[serde(default)]
    pub models: HashMap<String, ModelPricing>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_model: default_pricing_model(),
            models: HashMap::new(),
        }
    }
}

fn default_pricing_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Report settings
#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    /// Context window used for the peak-context percentage
    #[serde(default = "default_context_window")]
    pub context_window_tokens: i64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            context_window_tokens: default_context_window(),
        }
    }
}

fn default_context_window() -> i64 {
    200_000
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

        if config.display.context_window_tokens <= 0 {
            return Err(Error::Config(
                "display.context_window_tokens must be positive".to_string(),
            ));
        }

        Ok(config)
    }

    /// Agent data root: `[sources] claude_dir`, else `~/.claude`
    pub fn claude_dir(&self) -> PathBuf {
        self.sources
            .claude_dir
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude"))
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/claude-deck/config.toml` (~/.config/claude-deck/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/claude-deck/` (~/.local/share/claude-deck/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/claude-deck/` (~/.local/state/claude-deck/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join(APP_DIR)
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/claude-deck/data.db` (~/.local/share/claude-deck/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/claude-deck/claude-deck.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("claude-deck.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.sources.claude_dir.is_none());
        assert_eq!(config.pricing.default_model, "claude-sonnet-4-6");
        assert_eq!(config.display.context_window_tokens, 200_000);
        assert_eq!(config.logging.level, "info");
        assert!(config.claude_dir().ends_with(".claude"));
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[sources]
claude_dir = "/tmp/agent-logs"

[pricing]
default_model = "claude-opus-4-6"

[pricing.models.claude-opus-5]
input = 4.0
output = 20.0
cache_read = 0.4
cache_write_5m = 5.0
cache_write_1h = 8.0

[display]
context_window_tokens = 1000000

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.claude_dir(), PathBuf::from("/tmp/agent-logs"));
        assert_eq!(config.pricing.default_model, "claude-opus-4-6");
        let opus5 = config.pricing.models["claude-opus-5"];
        assert_eq!(opus5.output, 20.0);
        assert_eq!(config.display.context_window_tokens, 1_000_000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.max_files, 5);
    }

    #[test]
    fn test_load_from_rejects_bad_window() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[display]\ncontext_window_tokens = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_reports_toml_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging\nlevel = ").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
