//! # HMI Host
//!
//! Wires one field device, its registers, the device connection service
//! and the history writer into a single-threaded event loop.

pub mod error;
pub mod runtime;

pub use error::RuntimeError;
pub use runtime::{Client, Runtime, shutdown_signal};
