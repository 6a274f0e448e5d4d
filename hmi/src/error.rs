//! Host error types.

use hmi_common::config::ConfigError;
use hmi_common::init::InitError;
use hmi_history::HistoryError;
use hmi_modbus::ModbusError;
use hmi_services::ServiceError;
use thiserror::Error;

/// Errors that end the host process.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("startup error: {0}")]
    Init(#[from] InitError),

    #[error("register setup error: {0}")]
    Modbus(#[from] ModbusError),

    #[error("service setup error: {0}")]
    Service(#[from] ServiceError),

    #[error("history setup error: {0}")]
    History(#[from] HistoryError),

    /// The device stopped delivering replies.
    #[error("device link closed")]
    LinkClosed,
}
