//! Field-bus device and register configuration.
//!
//! # TOML Example
//!
//! ```toml
//! [device]
//! name = "plc"
//! latency_ms = 5
//! poll_interval_ms = 1000
//!
//! [[registers]]
//! name = "setpoint"
//! kind = "real"
//! address = 10
//! encoding = "float32"
//! write_mode = "postponed"
//! read_on_write = true
//! initial = 21.5
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::consts::{
    DEFAULT_LATENCY_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_TABLE_SIZE,
    DEFAULT_WRITE_DELAY_MS, MAX_TABLE_SIZE,
};

/// Device-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Device identifier used in logs.
    pub name: String,

    /// Simulated transport latency per request.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Background poll interval; 0 disables polling.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Age after which an unanswered request is reported as stuck.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Number of coils exposed by the device.
    #[serde(default = "default_table_size")]
    pub coils: u32,

    /// Number of holding registers exposed by the device.
    #[serde(default = "default_table_size")]
    pub holding_registers: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "device".to_string(),
            latency_ms: DEFAULT_LATENCY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            coils: DEFAULT_TABLE_SIZE,
            holding_registers: DEFAULT_TABLE_SIZE,
        }
    }
}

fn default_latency_ms() -> u64 {
    DEFAULT_LATENCY_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_table_size() -> u32 {
    DEFAULT_TABLE_SIZE
}

fn default_write_delay_ms() -> u64 {
    DEFAULT_WRITE_DELAY_MS
}

fn default_read_on_write() -> bool {
    true
}

/// Value kind of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// Single-bit coil.
    Coil,
    /// Holding register(s) interpreted as an integer.
    Int,
    /// Holding register(s) interpreted as a real number.
    Real,
}

/// Encoding of a value inside holding registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Signed 16-bit, one register.
    Int16,
    /// Unsigned 16-bit, one register.
    Uint16,
    /// Signed 32-bit, two registers, high word first.
    Int32,
    /// IEEE-754 single precision, two registers, high word first.
    Float32,
}

impl Encoding {
    /// Number of 16-bit registers occupied by the encoding.
    #[inline]
    pub const fn words(self) -> u16 {
        match self {
            Self::Int16 | Self::Uint16 => 1,
            Self::Int32 | Self::Float32 => 2,
        }
    }
}

/// Write policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriteModeKind {
    /// Write as soon as the value changes.
    Immediate,
    /// Write after the value has been stable for `write_delay_ms`.
    #[default]
    Delayed,
    /// Write now, or once after the request in flight completes.
    Postponed,
    /// Write only on explicit request.
    Explicit,
}

/// Initial target value written once the device link is up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialValue {
    /// Boolean literal (coils).
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Real(f64),
}

/// One register bound to the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterConfig {
    /// Unique register name (also the history tag name).
    pub name: String,

    /// Value kind.
    pub kind: RegisterKind,

    /// Start address in the coil or holding register table.
    pub address: u16,

    /// Encoding for `int`/`real` kinds. Must be absent for coils.
    #[serde(default)]
    pub encoding: Option<Encoding>,

    /// Write policy.
    #[serde(default)]
    pub write_mode: WriteModeKind,

    /// Delay used by the delayed write mode.
    #[serde(default = "default_write_delay_ms")]
    pub write_delay_ms: u64,

    /// Verify every successful write with a read-back.
    #[serde(default = "default_read_on_write")]
    pub read_on_write: bool,

    /// Target value requested after the device link comes up.
    #[serde(default)]
    pub initial: Option<InitialValue>,
}

impl RegisterConfig {
    /// Encoding after applying the per-kind default.
    ///
    /// Coils have no encoding; integers default to `int16`, reals to `float32`.
    pub fn effective_encoding(&self) -> Option<Encoding> {
        match self.kind {
            RegisterKind::Coil => None,
            RegisterKind::Int => Some(self.encoding.unwrap_or(Encoding::Int16)),
            RegisterKind::Real => Some(self.encoding.unwrap_or(Encoding::Float32)),
        }
    }

    /// Number of table entries occupied by the register.
    pub fn width(&self) -> u16 {
        self.effective_encoding().map_or(1, Encoding::words)
    }

    /// Validate the register against the device tables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `name` is empty
    /// - a coil declares an encoding
    /// - an integer uses `float32` or a real uses `int32`
    /// - the register does not fit into its table
    pub fn validate(&self, device: &DeviceConfig) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "register name cannot be empty".to_string(),
            ));
        }

        match (self.kind, self.encoding) {
            (RegisterKind::Coil, Some(enc)) => {
                return Err(ConfigError::ValidationError(format!(
                    "register '{}': coils do not take an encoding (got {enc:?})",
                    self.name
                )));
            }
            (RegisterKind::Int, Some(Encoding::Float32)) => {
                return Err(ConfigError::ValidationError(format!(
                    "register '{}': float32 encoding requires kind = \"real\"",
                    self.name
                )));
            }
            (RegisterKind::Real, Some(Encoding::Int32)) => {
                return Err(ConfigError::ValidationError(format!(
                    "register '{}': int32 encoding requires kind = \"int\"",
                    self.name
                )));
            }
            _ => {}
        }

        let table = match self.kind {
            RegisterKind::Coil => device.coils,
            RegisterKind::Int | RegisterKind::Real => device.holding_registers,
        };
        let end = u32::from(self.address) + u32::from(self.width());
        if end > table {
            return Err(ConfigError::ValidationError(format!(
                "register '{}': address {} + width {} exceeds table size {table}",
                self.name,
                self.address,
                self.width()
            )));
        }

        if self.write_mode == WriteModeKind::Delayed && self.write_delay_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "register '{}': delayed write mode needs write_delay_ms > 0",
                self.name
            )));
        }

        Ok(())
    }
}

impl DeviceConfig {
    /// Validate the device settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the name is empty or a
    /// table size is zero or above 65536.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "device name cannot be empty".to_string(),
            ));
        }
        for (table, size) in [("coils", self.coils), ("holding_registers", self.holding_registers)] {
            if size == 0 || size > MAX_TABLE_SIZE {
                return Err(ConfigError::ValidationError(format!(
                    "device '{}': {table} must be within 1..={MAX_TABLE_SIZE}, got {size}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
