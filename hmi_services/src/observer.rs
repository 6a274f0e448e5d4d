//! Transition observers.

use tracing::{debug, info, warn};

use crate::machine::{Cause, Transition};
use crate::state::{ServiceState, Trigger};

/// Receives every transition and every ignored trigger of a service,
/// synchronously and in order.
pub trait ServiceObserver {
    /// A transition was performed.
    fn on_transition(&mut self, service: &str, transition: &Transition);

    /// A trigger was not accepted.
    fn on_ignored(
        &mut self,
        _service: &str,
        _state: ServiceState,
        _trigger: Trigger,
        _reason: &'static str,
    ) {
    }

    /// A fault was reported.
    fn on_fault(&mut self, _service: &str, _reason: &str) {}
}

/// Observer writing to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ServiceObserver for LogObserver {
    fn on_transition(&mut self, service: &str, transition: &Transition) {
        match transition.cause {
            Cause::Trigger(trigger) => info!(
                service,
                %trigger,
                "{} -> {}",
                transition.from,
                transition.to
            ),
            Cause::Readiness => info!(service, "{} -> {}", transition.from, transition.to),
        }
    }

    fn on_ignored(
        &mut self,
        service: &str,
        state: ServiceState,
        trigger: Trigger,
        reason: &'static str,
    ) {
        debug!(service, %state, %trigger, "Trigger ignored: {}", reason);
    }

    fn on_fault(&mut self, service: &str, reason: &str) {
        warn!(service, "Fault reported: {}", reason);
    }
}
