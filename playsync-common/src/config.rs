//! Configuration loading
//!
//! Bootstrap configuration is a single TOML file:
//!
//! ```toml
//! [controller]
//! seek_expiry_ms = 5000
//! duration_poll_interval_ms = 100
//! event_capacity = 256
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Resolution Priority
//!
//! 1. Explicit path (command-line argument)
//! 2. `PLAYSYNC_CONFIG` environment variable
//! 3. `<config_dir>/playsync/config.toml`
//! 4. Built-in defaults
//!
//! An explicit path (1 or 2) that does not exist is an error. A missing file
//! at the platform location falls through to defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PLAYSYNC_CONFIG";

/// Top-level TOML document
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct TomlConfig {
    /// Controller timing and channel settings
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Timing and channel settings for a playback controller
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// How long a seek requested before readiness stays eligible for replay
    pub seek_expiry_ms: u64,

    /// Delay between duration probes while the backend reports no duration
    pub duration_poll_interval_ms: u64,

    /// Broadcast capacity of the caller-facing event bus
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            seek_expiry_ms: 5000,
            duration_poll_interval_ms: 100,
            event_capacity: 256,
        }
    }
}

impl ControllerConfig {
    pub fn seek_expiry(&self) -> Duration {
        Duration::from_millis(self.seek_expiry_ms)
    }

    pub fn duration_poll_interval(&self) -> Duration {
        Duration::from_millis(self.duration_poll_interval_ms)
    }

    /// Reject settings that would make the controller spin or drop everything
    pub fn validate(&self) -> Result<()> {
        if self.duration_poll_interval_ms == 0 {
            return Err(Error::Config(
                "duration_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.seek_expiry_ms == 0 {
            return Err(Error::Config(
                "seek_expiry_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve and load configuration following the priority order above
pub fn load_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        debug!("Using config file from command line: {}", path.display());
        return load_from_file(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        debug!("Using config file from {}: {}", CONFIG_ENV_VAR, path);
        return load_from_file(Path::new(&path));
    }

    // Priority 3: Platform config directory
    if let Some(path) = default_config_path() {
        if path.exists() {
            return load_from_file(&path);
        }
        warn!(
            "No config file at {}, using built-in defaults",
            path.display()
        );
    }

    // Priority 4: Built-in defaults
    Ok(TomlConfig::default())
}

/// Load and validate a specific config file
pub fn load_from_file(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.controller.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Platform location of the user config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("playsync").join("config.toml"))
}
