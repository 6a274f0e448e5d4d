//! # HMI Modbus
//!
//! Keeps application-level register values in sync with a field device.
//!
//! ```text
//! RegisterBank ── issue_read/issue_write ──▶ DeviceClient ── submit ──▶ DeviceTransport
//!      ▲                                         │ correlator                │
//!      └──────────── dispatch(Completion) ◀──────┴──── resolve(Reply) ◀──────┘
//! ```
//!
//! Everything here runs on one thread. Controllers share the client as
//! `Rc<DeviceClient<_>>`; replies and timers are fed in by the host loop.

pub mod bank;
pub mod controller;
pub mod correlator;
pub mod function;
pub mod request;
pub mod service;
pub mod simulation;
pub mod transport;
pub mod value;

pub use bank::{AnyRegister, BankEvent, ModbusError, PollSpan, RegisterBank, Value};
pub use controller::{RegisterController, RegisterEvent, RegisterStatus, WriteMode};
pub use correlator::{PendingRequest, RequestCorrelator};
pub use function::{Function, Table};
pub use request::{Completion, Payload, Reply, Request, RequestId};
pub use service::{CONNECTED, DISCONNECTED, DeviceService, LinkCommand};
pub use simulation::{DeviceSimulator, SimulatedDevice, SimulatorLink};
pub use transport::{
    ChannelTransport, DeviceClient, DeviceTransport, RequestIssuer, StaleRequest, TransportError,
};
pub use value::{Coil, IntRegister, RealRegister, ValueKind};
