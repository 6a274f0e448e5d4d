//! HMI Common Library
//!
//! Shared configuration, logging and startup sequencing for all HMI
//! workspace crates.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading trait, shared and top-level config
//! - [`device`] - Field-bus device and register configuration
//! - [`consts`] - Default values and limits
//! - [`logging`] - Tracing subscriber setup
//! - [`init`] - Explicit startup/shutdown sequence for process subsystems
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust,no_run
//! use hmi_common::config::{ConfigLoader, HmiConfig};
//! use std::path::Path;
//!
//! let config = HmiConfig::load(Path::new("hmi.toml")).unwrap();
//! config.validate().unwrap();
//! ```

pub mod config;
pub mod consts;
pub mod device;
pub mod init;
pub mod logging;
pub mod prelude;
