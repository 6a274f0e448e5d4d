//! Generic service lifecycle state machine.
//!
//! Stopped → Starting → Started{Active|Idling|Yielding} → Stopping → Stopped,
//! any → Broken on fault, Broken → Repairing → Started, and
//! Starting/Started → Evacuating → Stopped.
//!
//! The machine owns the current state, the readiness rules and the flag
//! values. It never runs entry or exit actions itself: [`handle`] and
//! [`evaluate`] return the [`Transition`] they performed and the caller
//! dispatches it (see [`crate::service::Service`]).
//!
//! [`handle`]: ServiceStateMachine::handle
//! [`evaluate`]: ServiceStateMachine::evaluate

use std::collections::HashMap;

use crate::error::ServiceError;
use crate::state::{Activity, ServiceState, StateKey, Trigger};
use crate::status::{ReadinessFlags, Statuses};

/// What caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// An external trigger.
    Trigger(Trigger),
    /// A readiness rule changed value.
    Readiness,
}

/// A performed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State left.
    pub from: ServiceState,
    /// State entered.
    pub to: ServiceState,
    /// Why.
    pub cause: Cause,
}

impl Transition {
    /// Whether the transition enters `Started` from another top-level state.
    #[inline]
    pub const fn enters_started(&self) -> bool {
        !self.from.is_started() && self.to.is_started()
    }

    /// Whether the transition leaves `Started` for another top-level state.
    #[inline]
    pub const fn leaves_started(&self) -> bool {
        self.from.is_started() && !self.to.is_started()
    }
}

/// Result of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Trigger accepted.
    Ok(Transition),
    /// Trigger not accepted in the current state. Not an error.
    Ignored(&'static str),
}

impl TransitionResult {
    /// Whether the trigger was accepted.
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Lifecycle state, readiness rules and flag values of one service.
#[derive(Debug, Default)]
pub struct ServiceStateMachine {
    state: ServiceState,
    rules: HashMap<StateKey, Statuses>,
    flags: ReadinessFlags,
}

impl ServiceStateMachine {
    /// Create a machine in `Stopped` with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the readiness rule of `key`.
    ///
    /// Named flags are declared `false` unless already set.
    ///
    /// # Errors
    ///
    /// - `ServiceError::EmptyStatuses` for an empty rule on a non-terminal state
    /// - `ServiceError::AlreadyConfigured` if `key` has a rule
    pub fn configure(&mut self, key: StateKey, statuses: Statuses) -> Result<(), ServiceError> {
        if statuses.is_empty() && !key.is_terminal() {
            return Err(ServiceError::EmptyStatuses { state: key });
        }
        if self.rules.contains_key(&key) {
            return Err(ServiceError::AlreadyConfigured { state: key });
        }
        for flag in statuses.flags() {
            self.flags.declare(flag);
        }
        self.rules.insert(key, statuses);
        Ok(())
    }

    /// Current state snapshot.
    #[inline]
    pub const fn current_state(&self) -> ServiceState {
        self.state
    }

    /// Flag values.
    #[inline]
    pub fn flags(&self) -> &ReadinessFlags {
        &self.flags
    }

    /// Update a flag. Returns `true` if its value changed.
    ///
    /// Does not transition; call [`evaluate`](Self::evaluate) afterwards.
    pub fn set_flag(&mut self, name: &str, value: bool) -> bool {
        self.flags.set(name, value)
    }

    /// Value of the rule of `key`, or its default when unconfigured.
    pub fn holds(&self, key: StateKey) -> bool {
        self.rules
            .get(&key)
            .map_or(key.default_holds(), |rule| rule.holds(&self.flags))
    }

    /// Apply an external trigger.
    pub fn handle(&mut self, trigger: Trigger) -> TransitionResult {
        use ServiceState::*;
        use Trigger::*;

        let next = match (self.state, trigger) {
            // Accepted from every state, including Broken itself.
            (_, Fault) => Broken,

            (Stopped, Start) if self.holds(StateKey::Stopped) => Starting,
            (Stopped, Start) => return TransitionResult::Ignored("start gate not satisfied"),

            (Starting | Started(_) | Broken | Repairing, Stop) => Stopping,

            (Broken, Repair) if self.holds(StateKey::Broken) => Repairing,
            (Broken, Repair) => return TransitionResult::Ignored("repair gate not satisfied"),

            (Starting | Started(_), Evacuate) => Evacuating,

            (state, trigger) => return TransitionResult::Ignored(ignored_reason(state, trigger)),
        };

        TransitionResult::Ok(self.enter(next, Cause::Trigger(trigger)))
    }

    /// Take at most one readiness-driven step.
    ///
    /// Returns `None` when the current state is stable under the current
    /// flags.
    pub fn evaluate(&mut self) -> Option<Transition> {
        use ServiceState::*;

        let next = match self.state {
            Starting if self.holds(StateKey::Starting) => Started(self.select_activity()),
            Started(_) if !self.holds(StateKey::Started) => Broken,
            Started(current) => {
                let activity = self.select_activity();
                if activity == current {
                    return None;
                }
                Started(activity)
            }
            Stopping if self.holds(StateKey::Stopping) => Stopped,
            Repairing if self.holds(StateKey::Repairing) => Started(self.select_activity()),
            Evacuating if self.holds(StateKey::Evacuating) => Stopped,
            _ => return None,
        };

        Some(self.enter(next, Cause::Readiness))
    }

    /// Sub-state of `Started` under the current flags.
    fn select_activity(&self) -> Activity {
        if self.holds(StateKey::Yielding) {
            Activity::Yielding
        } else if self.holds(StateKey::Idling) {
            Activity::Idling
        } else {
            Activity::Active
        }
    }

    fn enter(&mut self, to: ServiceState, cause: Cause) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to, cause }
    }
}

fn ignored_reason(state: ServiceState, trigger: Trigger) -> &'static str {
    use ServiceState::*;
    use Trigger::*;

    match (state, trigger) {
        (Starting | Started(_) | Stopping | Repairing | Evacuating | Broken, Start) => {
            "service is not stopped"
        }
        (Stopped, Stop) => "service is already stopped",
        (Stopping | Evacuating, Stop) => "service is already stopping",
        (_, Repair) => "service is not broken",
        (_, Evacuate) => "service is neither starting nor started",
        _ => "trigger not accepted in current state",
    }
}
