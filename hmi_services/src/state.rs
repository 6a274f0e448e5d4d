//! Service lifecycle states and external triggers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sub-state of [`ServiceState::Started`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Activity {
    /// Doing its work.
    #[default]
    Active = 0,
    /// Started but has nothing to do.
    Idling = 1,
    /// Started but deliberately holding back (e.g. collaborator busy).
    Yielding = 2,
}

/// Lifecycle state of a supervised service.
///
/// Exactly one state is active at any time. `Broken` is left only through
/// `Repairing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ServiceState {
    /// Initial state; also reached at the end of every stop cycle.
    #[default]
    Stopped,
    /// Waiting for the starting readiness rule.
    Starting,
    /// Running, with a sub-state.
    Started(Activity),
    /// Waiting for the stopping readiness rule.
    Stopping,
    /// Faulted; waits for an explicit repair request.
    Broken,
    /// Waiting for the repairing readiness rule.
    Repairing,
    /// Graceful degradation in progress; ends in `Stopped`.
    Evacuating,
}

impl ServiceState {
    /// Whether the state is `Started` with any sub-state.
    #[inline]
    pub const fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    /// Whether the state is `Stopped`.
    #[inline]
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Rule key of the state (the sub-state is folded into `Started`).
    #[inline]
    pub const fn key(&self) -> StateKey {
        match self {
            Self::Stopped => StateKey::Stopped,
            Self::Starting => StateKey::Starting,
            Self::Started(_) => StateKey::Started,
            Self::Stopping => StateKey::Stopping,
            Self::Broken => StateKey::Broken,
            Self::Repairing => StateKey::Repairing,
            Self::Evacuating => StateKey::Evacuating,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("Stopped"),
            Self::Starting => f.write_str("Starting"),
            Self::Started(Activity::Active) => f.write_str("Started.Active"),
            Self::Started(Activity::Idling) => f.write_str("Started.Idling"),
            Self::Started(Activity::Yielding) => f.write_str("Started.Yielding"),
            Self::Stopping => f.write_str("Stopping"),
            Self::Broken => f.write_str("Broken"),
            Self::Repairing => f.write_str("Repairing"),
            Self::Evacuating => f.write_str("Evacuating"),
        }
    }
}

/// Key under which a readiness rule is configured.
///
/// | Key        | Rule meaning                                   | Unconfigured |
/// |------------|------------------------------------------------|--------------|
/// | Stopped    | gate for `start()`                             | holds        |
/// | Starting   | exit condition → Started                       | holds        |
/// | Started    | stay condition; turning false → Broken         | holds        |
/// | Idling     | Started sub-state condition                    | never        |
/// | Yielding   | Started sub-state condition, wins over Idling  | never        |
/// | Stopping   | exit condition → Stopped                       | holds        |
/// | Broken     | gate for `request_repair()`                    | holds        |
/// | Repairing  | exit condition → Started                       | holds        |
/// | Evacuating | exit condition → Stopped                       | holds        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKey {
    /// `Stopped`.
    Stopped,
    /// `Starting`.
    Starting,
    /// `Started` (any sub-state).
    Started,
    /// `Started.Idling`.
    Idling,
    /// `Started.Yielding`.
    Yielding,
    /// `Stopping`.
    Stopping,
    /// `Broken`.
    Broken,
    /// `Repairing`.
    Repairing,
    /// `Evacuating`.
    Evacuating,
}

impl StateKey {
    /// Every key, in lifecycle order.
    pub const ALL: [StateKey; 9] = [
        StateKey::Stopped,
        StateKey::Starting,
        StateKey::Started,
        StateKey::Idling,
        StateKey::Yielding,
        StateKey::Stopping,
        StateKey::Broken,
        StateKey::Repairing,
        StateKey::Evacuating,
    ];

    /// `Stopped` ends every cycle and may be configured with no flags.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Value of the rule when the consumer did not configure one.
    #[inline]
    pub const fn default_holds(self) -> bool {
        !matches!(self, Self::Idling | Self::Yielding)
    }
}

/// External lifecycle trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    /// `start()`.
    Start,
    /// `stop()`.
    Stop,
    /// `report_fault()`.
    Fault,
    /// `request_repair()`.
    Repair,
    /// `evacuate()`.
    Evacuate,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Fault => "fault",
            Self::Repair => "repair",
            Self::Evacuate => "evacuate",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_stopped() {
        assert_eq!(ServiceState::default(), ServiceState::Stopped);
        assert_eq!(Activity::default(), Activity::Active);
    }

    #[test]
    fn started_folds_sub_states() {
        for activity in [Activity::Active, Activity::Idling, Activity::Yielding] {
            let state = ServiceState::Started(activity);
            assert!(state.is_started());
            assert_eq!(state.key(), StateKey::Started);
        }
        assert!(!ServiceState::Starting.is_started());
    }

    #[test]
    fn only_stopped_is_terminal() {
        let terminal: Vec<_> = StateKey::ALL.iter().filter(|k| k.is_terminal()).collect();
        assert_eq!(terminal, vec![&StateKey::Stopped]);
    }

    #[test]
    fn sub_state_rules_default_to_false() {
        assert!(!StateKey::Idling.default_holds());
        assert!(!StateKey::Yielding.default_holds());
        assert!(StateKey::Starting.default_holds());
    }

    #[test]
    fn display_names() {
        assert_eq!(ServiceState::Started(Activity::Idling).to_string(), "Started.Idling");
        assert_eq!(Trigger::Repair.to_string(), "repair");
    }
}
