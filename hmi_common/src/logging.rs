//! Tracing subscriber setup.
//!
//! The host process installs the subscriber once, as the first step of its
//! startup sequence. Installation is idempotent: a second call reports
//! [`InitError::AlreadyInitialized`] instead of panicking, so tests and
//! embedded hosts may call it freely.

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;
use crate::init::{InitError, Subsystem};

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` directives are honoured; `level` is added as the default
/// directive. With `json` the output is line-delimited JSON.
pub fn init_tracing(level: LogLevel, json: bool) -> Result<(), InitError> {
    let filter = EnvFilter::from_default_env().add_directive(Level::from(level).into());

    let result = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_line_number(true)
            .try_init()
    };

    result.map_err(|_| InitError::AlreadyInitialized { subsystem: "logging" })
}

/// Logging as a startup-sequence subsystem.
#[derive(Debug, Clone, Copy)]
pub struct LoggingSubsystem {
    level: LogLevel,
    json: bool,
}

impl LoggingSubsystem {
    /// Create the subsystem with the given verbosity and format.
    pub const fn new(level: LogLevel, json: bool) -> Self {
        Self { level, json }
    }
}

impl Subsystem for LoggingSubsystem {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn init(&mut self) -> Result<(), InitError> {
        match init_tracing(self.level, self.json) {
            // An embedding host may already own the global subscriber.
            Err(InitError::AlreadyInitialized { .. }) => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_maps_to_tracing_level() {
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn subsystem_init_is_idempotent() {
        let mut first = LoggingSubsystem::new(LogLevel::Debug, false);
        let mut second = LoggingSubsystem::new(LogLevel::Info, true);
        assert!(first.init().is_ok());
        assert!(second.init().is_ok());
    }
}
