//! # HMI Services
//!
//! Supervisory lifecycle shared by every long-running HMI component
//! (device links, history writers):
//!
//! ```text
//!            start            rule(Starting)
//! Stopped ─────────▶ Starting ───────────────▶ Started{Active|Idling|Yielding}
//!    ▲                  │ evacuate                 │ stop        │ evacuate
//!    │                  ▼                          ▼             ▼
//!    ├──── rule ──── Evacuating ◀──────────────────┼──────── Evacuating
//!    └──── rule ──── Stopping   ◀──────────────────┘
//!
//! any ── fault ──▶ Broken ── repair ──▶ Repairing ── rule ──▶ Started
//! ```
//!
//! Concrete services implement [`Serviceable`]; [`Service`] runs their
//! entry/exit actions to completion after every trigger or flag change.

pub mod error;
pub mod group;
pub mod machine;
pub mod observer;
pub mod service;
pub mod state;
pub mod status;

pub use error::ServiceError;
pub use group::{ServiceGroup, Supervised};
pub use machine::{Cause, ServiceStateMachine, Transition, TransitionResult};
pub use observer::{LogObserver, ServiceObserver};
pub use service::{Service, ServiceContext, ServiceRules, Serviceable};
pub use state::{Activity, ServiceState, StateKey, Trigger};
pub use status::{ReadinessFlags, Statuses};
