//! Ordered supervision of several services.
//!
//! Services start in registration order and stop or evacuate in reverse,
//! so a service is only ever running while the ones it depends on are.

use tracing::info;

use crate::machine::TransitionResult;
use crate::service::{Service, Serviceable};
use crate::state::ServiceState;

/// Type-erased view of a [`Service`] used by [`ServiceGroup`].
pub trait Supervised {
    /// Service name.
    fn name(&self) -> &str;
    /// Current state snapshot.
    fn current_state(&self) -> ServiceState;
    /// `start()` trigger.
    fn start(&mut self) -> TransitionResult;
    /// `stop()` trigger.
    fn stop(&mut self) -> TransitionResult;
    /// `evacuate()` trigger.
    fn evacuate(&mut self) -> TransitionResult;
}

impl<S: Serviceable> Supervised for Service<S> {
    fn name(&self) -> &str {
        Service::name(self)
    }

    fn current_state(&self) -> ServiceState {
        Service::current_state(self)
    }

    fn start(&mut self) -> TransitionResult {
        Service::start(self)
    }

    fn stop(&mut self) -> TransitionResult {
        Service::stop(self)
    }

    fn evacuate(&mut self) -> TransitionResult {
        Service::evacuate(self)
    }
}

/// Borrowed, ordered set of services.
#[derive(Default)]
pub struct ServiceGroup<'a> {
    members: Vec<&'a mut dyn Supervised>,
}

impl<'a> ServiceGroup<'a> {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member.
    pub fn with(mut self, member: &'a mut dyn Supervised) -> Self {
        self.members.push(member);
        self
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no member.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Start every member in order. Returns the number that accepted.
    pub fn start_all(&mut self) -> usize {
        let mut accepted = 0;
        for member in self.members.iter_mut() {
            if member.start().is_ok() {
                accepted += 1;
            }
        }
        info!("Started {}/{} service(s)", accepted, self.members.len());
        accepted
    }

    /// Stop every member in reverse order. Returns the number that accepted.
    pub fn stop_all(&mut self) -> usize {
        let mut accepted = 0;
        for member in self.members.iter_mut().rev() {
            if member.stop().is_ok() {
                accepted += 1;
            }
        }
        info!("Stopping {}/{} service(s)", accepted, self.members.len());
        accepted
    }

    /// Evacuate every member in reverse order.
    pub fn evacuate_all(&mut self) -> usize {
        let mut accepted = 0;
        for member in self.members.iter_mut().rev() {
            if member.evacuate().is_ok() {
                accepted += 1;
            }
        }
        accepted
    }

    /// `(name, state)` of every member in order.
    pub fn states(&self) -> Vec<(String, ServiceState)> {
        self.members
            .iter()
            .map(|m| (m.name().to_string(), m.current_state()))
            .collect()
    }

    /// Whether every member is `Stopped`.
    pub fn all_stopped(&self) -> bool {
        self.members.iter().all(|m| m.current_state().is_stopped())
    }

    /// Whether every member is `Started`.
    pub fn all_started(&self) -> bool {
        self.members.iter().all(|m| m.current_state().is_started())
    }
}
