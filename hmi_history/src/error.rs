//! History error types.

use thiserror::Error;

/// Errors raised by history stores and the writer.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The store rejected an operation.
    #[error("history store error: {0}")]
    Store(String),

    /// The store is not ready to receive tuples.
    #[error("history schema invalid: {0}")]
    SchemaInvalid(String),

    /// Writer settings out of range.
    #[error("invalid history settings: {0}")]
    InvalidSettings(String),

    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
