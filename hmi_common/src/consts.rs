//! Workspace-wide defaults and limits.
//!
//! Single source of truth for numeric defaults used by configuration
//! deserialization and by the runtime crates.

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hmi/hmi.toml";

/// Default delay of the delayed write mode, in milliseconds.
pub const DEFAULT_WRITE_DELAY_MS: u64 = 500;

/// Default background poll interval of a device, in milliseconds.
/// Zero disables polling.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Age after which an unanswered request is reported as stuck, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

/// Default simulated transport latency, in milliseconds.
pub const DEFAULT_LATENCY_MS: u64 = 5;

/// Default number of coils and holding registers exposed by a device.
pub const DEFAULT_TABLE_SIZE: u32 = 1024;

/// Largest addressable table (16-bit addressing).
pub const MAX_TABLE_SIZE: u32 = 65536;

/// Default interval between history samples, in milliseconds.
pub const DEFAULT_HISTORY_INTERVAL_MS: u64 = 100;

/// Default number of samples aggregated into one history tuple.
pub const DEFAULT_HISTORY_SAMPLES: u32 = 100;
