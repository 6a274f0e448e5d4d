//! # HMI History
//!
//! Samples tag values at a fixed interval, folds them into
//! open/close/min/max candles and writes the candles to a
//! [`HistoryStore`] once per batch of samples.
//!
//! The writer is a [`Serviceable`](hmi_services::Serviceable): wrap it in a
//! [`Service`](hmi_services::Service) and drive it with
//! [`HistoryWriter::tick`] through `Service::update`.

pub mod candle;
pub mod error;
pub mod store;
pub mod writer;

pub use candle::{Candle, CandleBatch, Sample};
pub use error::HistoryError;
pub use store::{HistoryStore, JsonLinesStore, MemoryStore};
pub use writer::{FLUSHED, HistorySettings, HistoryWriter, NO_TAGS, SCHEMA_VALIDATED, STORE_BUSY};
