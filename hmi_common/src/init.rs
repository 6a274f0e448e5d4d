//! Explicit startup/shutdown sequence for process subsystems.
//!
//! Subsystems are initialized in registration order and shut down in
//! reverse order by the hosting process. Nothing relies on static
//! construction order: a subsystem is only ever touched through the
//! [`Startup`] that owns it.
//!
//! ```text
//! Startup::new()
//!     .with(logging)      ── init #1 ── shutdown #3
//!     .with(device_link)  ── init #2 ── shutdown #2
//!     .with(services)     ── init #3 ── shutdown #1
//! ```
//!
//! If init of subsystem N fails, subsystems N-1..1 are shut down before
//! the error is returned.

use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while bringing subsystems up or down.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    /// Subsystem-specific failure.
    #[error("subsystem '{subsystem}' failed: {reason}")]
    Failed {
        /// Subsystem name.
        subsystem: &'static str,
        /// Failure description.
        reason: String,
    },

    /// The subsystem (or the sequence) is already initialized.
    #[error("subsystem '{subsystem}' is already initialized")]
    AlreadyInitialized {
        /// Subsystem name.
        subsystem: &'static str,
    },
}

/// A process-wide resource with explicit init and teardown.
pub trait Subsystem {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Bring the subsystem up. Called at most once per startup cycle.
    fn init(&mut self) -> Result<(), InitError>;

    /// Tear the subsystem down. Called only after a successful `init()`.
    fn shutdown(&mut self) -> Result<(), InitError> {
        Ok(())
    }
}

/// Ordered collection of subsystems driven by the host.
#[derive(Default)]
pub struct Startup {
    subsystems: Vec<Box<dyn Subsystem>>,
    /// Number of leading subsystems currently initialized.
    initialized: usize,
}

impl Startup {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subsystem.
    pub fn with(mut self, subsystem: impl Subsystem + 'static) -> Self {
        self.subsystems.push(Box::new(subsystem));
        self
    }

    /// Number of registered subsystems.
    pub fn len(&self) -> usize {
        self.subsystems.len()
    }

    /// Whether no subsystem is registered.
    pub fn is_empty(&self) -> bool {
        self.subsystems.is_empty()
    }

    /// Whether `init_all()` completed and `shutdown_all()` has not run yet.
    pub fn is_initialized(&self) -> bool {
        !self.subsystems.is_empty() && self.initialized == self.subsystems.len()
    }

    /// Initialize every subsystem in order.
    ///
    /// # Errors
    ///
    /// - `InitError::AlreadyInitialized` if the sequence is already up
    /// - the first subsystem error; already initialized subsystems are
    ///   shut down in reverse order before returning
    pub fn init_all(&mut self) -> Result<(), InitError> {
        if self.initialized > 0 {
            return Err(InitError::AlreadyInitialized {
                subsystem: "startup",
            });
        }

        for index in 0..self.subsystems.len() {
            let subsystem = &mut self.subsystems[index];
            debug!("Initializing subsystem '{}'", subsystem.name());
            if let Err(e) = subsystem.init() {
                warn!("Subsystem '{}' failed to initialize: {}", subsystem.name(), e);
                self.shutdown_all();
                return Err(e);
            }
            self.initialized = index + 1;
        }

        info!("{} subsystem(s) initialized", self.initialized);
        Ok(())
    }

    /// Shut down initialized subsystems in reverse order.
    ///
    /// Every initialized subsystem is visited even if an earlier one fails;
    /// the collected errors are returned.
    pub fn shutdown_all(&mut self) -> Vec<InitError> {
        let mut errors = Vec::new();
        while self.initialized > 0 {
            self.initialized -= 1;
            let subsystem = &mut self.subsystems[self.initialized];
            debug!("Shutting down subsystem '{}'", subsystem.name());
            if let Err(e) = subsystem.shutdown() {
                warn!("Subsystem '{}' shutdown failed: {}", subsystem.name(), e);
                errors.push(e);
            }
        }
        errors
    }
}

impl Drop for Startup {
    fn drop(&mut self) {
        if self.initialized > 0 {
            warn!("Startup sequence dropped while initialized; shutting down");
            self.shutdown_all();
        }
    }
}
