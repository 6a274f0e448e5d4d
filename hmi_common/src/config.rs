//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across all HMI applications, plus the top-level [`HmiConfig`] consumed by
//! the host process.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hmi_common::config::{ConfigLoader, SharedConfig, ConfigError};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct MyAppConfig {
//!     shared: SharedConfig,
//!     port: u16,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MyAppConfig::load(Path::new("config.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consts::{DEFAULT_HISTORY_INTERVAL_MS, DEFAULT_HISTORY_SAMPLES};
use crate::device::{DeviceConfig, RegisterConfig};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

/// Common configuration fields shared across all HMI applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "hmi-line-1"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// History writer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Interval between samples; 0 disables sampling.
    #[serde(default = "default_history_interval_ms")]
    pub interval_ms: u64,

    /// Number of samples aggregated into one stored tuple.
    #[serde(default = "default_history_samples")]
    pub samples: u32,

    /// Register names to sample. Empty means every register.
    #[serde(default)]
    pub tags: Vec<String>,

    /// JSON-lines file receiving the tuples. Kept in memory when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_HISTORY_INTERVAL_MS,
            samples: DEFAULT_HISTORY_SAMPLES,
            tags: Vec::new(),
            path: None,
        }
    }
}

fn default_history_interval_ms() -> u64 {
    DEFAULT_HISTORY_INTERVAL_MS
}

fn default_history_samples() -> u32 {
    DEFAULT_HISTORY_SAMPLES
}

/// Top-level configuration of the host process.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "hmi-line-1"
///
/// [device]
/// name = "plc"
///
/// [[registers]]
/// name = "pump"
/// kind = "coil"
/// address = 0
///
/// [history]
/// interval_ms = 100
/// samples = 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HmiConfig {
    /// Shared fields.
    pub shared: SharedConfig,

    /// Field-bus device.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Registers mirrored from the device.
    #[serde(default)]
    pub registers: Vec<RegisterConfig>,

    /// History writer.
    #[serde(default)]
    pub history: HistoryConfig,
}

impl HmiConfig {
    /// Validate the whole configuration tree.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - shared, device or any register section is invalid
    /// - two registers share a name
    /// - `history.samples` is zero
    /// - a history tag does not name a register
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.device.validate()?;

        let mut names = HashSet::new();
        for register in &self.registers {
            register.validate(&self.device)?;
            if !names.insert(register.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate register name '{}'",
                    register.name
                )));
            }
        }

        if self.history.samples == 0 {
            return Err(ConfigError::ValidationError(
                "history.samples must be greater than zero".to_string(),
            ));
        }
        for tag in &self.history.tags {
            if !names.contains(tag.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "history tag '{tag}' does not name a register"
                )));
            }
        }

        Ok(())
    }

    /// Registers sampled by the history writer.
    pub fn history_registers(&self) -> impl Iterator<Item = &RegisterConfig> {
        self.registers
            .iter()
            .filter(|r| self.history.tags.is_empty() || self.history.tags.contains(&r.name))
    }
}

/// Trait for loading configuration from TOML files.
///
/// Provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
