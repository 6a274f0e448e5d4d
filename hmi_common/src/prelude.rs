//! Prelude module for common re-exports.
//!
//! ```rust
//! use hmi_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;
pub use crate::logging::{LoggingSubsystem, init_tracing};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, HistoryConfig, HmiConfig, SharedConfig};
pub use crate::device::{
    DeviceConfig, Encoding, InitialValue, RegisterConfig, RegisterKind, WriteModeKind,
};

// ─── Startup ────────────────────────────────────────────────────────
pub use crate::init::{InitError, Startup, Subsystem};
