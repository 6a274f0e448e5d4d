//! Service configuration errors.

use thiserror::Error;

use crate::state::StateKey;

/// Errors raised while configuring a service.
///
/// Lifecycle triggers never fail: invalid triggers are ignored and
/// reported to observers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// A non-terminal state was configured with an empty rule.
    #[error("state {state:?} needs at least one readiness flag")]
    EmptyStatuses {
        /// Offending state key.
        state: StateKey,
    },

    /// The same state was configured twice.
    #[error("state {state:?} is already configured")]
    AlreadyConfigured {
        /// Offending state key.
        state: StateKey,
    },
}
