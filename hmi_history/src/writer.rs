//! Periodic history writer.
//!
//! While `Started.Active` the host calls [`HistoryWriter::tick`] every
//! [`interval`](HistoryWriter::interval) with the current tag values. Every
//! `samples` ticks the accumulated candles go to the store and a new batch
//! begins.
//!
//! | State | Readiness rule | Action |
//! |---|---|---|
//! | Starting, Repairing | `schema_validated` | validate the store schema |
//! | Started | `schema_validated` | sample while Active |
//! | Idling | `no_tags` | nothing to sample |
//! | Yielding | `store_busy` | sampling paused |
//! | Stopping, Evacuating | `flushed` | insert the pending batch |

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmi_common::config::HmiConfig;
use hmi_services::{
    Activity, ServiceContext, ServiceError, ServiceRules, ServiceState, Serviceable, StateKey,
    Statuses, Transition,
};
use tracing::{debug, warn};

use crate::candle::{CandleBatch, Sample};
use crate::error::HistoryError;
use crate::store::HistoryStore;

/// Set once the store accepted the schema check.
pub const SCHEMA_VALIDATED: &str = "schema_validated";
/// Set once pending candles were handed over on the way down.
pub const FLUSHED: &str = "flushed";
/// Set when there is nothing to sample.
pub const NO_TAGS: &str = "no_tags";
/// Mirrors [`HistoryStore::is_busy`].
pub const STORE_BUSY: &str = "store_busy";

/// Sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySettings {
    pub interval: Duration,
    pub samples: u32,
    pub tags: Vec<String>,
}

impl HistorySettings {
    /// Settings of the `[history]` section. Tags resolve to every register
    /// when the section names none.
    pub fn from_config(config: &HmiConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.history.interval_ms),
            samples: config.history.samples,
            tags: config
                .history_registers()
                .map(|register| register.name.clone())
                .collect(),
        }
    }
}

/// Aggregates tag samples into candles and stores them in batches.
#[derive(Debug)]
pub struct HistoryWriter<S> {
    store: S,
    interval: Duration,
    samples: u32,
    tags: BTreeSet<String>,
    counter: u32,
    pending: CandleBatch,
    sampling: bool,
}

impl<S: HistoryStore> HistoryWriter<S> {
    /// # Errors
    ///
    /// `HistoryError::InvalidSettings` when `samples` is zero.
    pub fn new(store: S, settings: HistorySettings) -> Result<Self, HistoryError> {
        if settings.samples == 0 {
            return Err(HistoryError::InvalidSettings(
                "samples must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            store,
            interval: settings.interval,
            samples: settings.samples,
            tags: settings.tags.into_iter().collect(),
            counter: 0,
            pending: CandleBatch::new(),
            sampling: false,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Time between two ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Whether ticks currently take samples.
    pub fn is_sampling(&self) -> bool {
        self.sampling
    }

    /// Ticks taken since the last insert.
    pub fn pending_samples(&self) -> u32 {
        self.counter
    }

    /// Candles waiting for the next insert.
    pub fn pending(&self) -> &CandleBatch {
        &self.pending
    }

    fn is_idle(&self) -> bool {
        self.tags.is_empty() || self.interval.is_zero()
    }

    /// Take one sample of every configured tag present in `values`.
    ///
    /// The store's busy state is refreshed on every call, sampling or not,
    /// so the service can leave `Yielding` again.
    pub fn tick<'a>(
        &mut self,
        values: impl IntoIterator<Item = (&'a str, Sample)>,
        now: DateTime<Utc>,
        ctx: &mut ServiceContext,
    ) {
        ctx.set_flag(STORE_BUSY, self.store.is_busy());
        if !self.sampling {
            return;
        }

        for (tag, sample) in values {
            if self.tags.contains(tag) {
                self.pending.add(tag, sample, now);
            }
        }
        self.counter += 1;

        if self.counter >= self.samples {
            if let Err(e) = self.insert_pending() {
                ctx.report_fault(format!("history insert failed: {e}"));
            }
        }
    }

    fn insert_pending(&mut self) -> Result<(), HistoryError> {
        if !self.pending.is_empty() {
            self.store.insert(&self.pending)?;
            debug!(candles = self.pending.len(), samples = self.counter, "History batch stored");
        }
        self.pending.clear();
        self.counter = 0;
        Ok(())
    }

    fn validate(&mut self, ctx: &mut ServiceContext) {
        ctx.set_flag(NO_TAGS, self.is_idle());
        ctx.set_flag(STORE_BUSY, self.store.is_busy());
        match self.store.validate_schema() {
            Ok(()) => ctx.set_flag(SCHEMA_VALIDATED, true),
            Err(e) => {
                ctx.set_flag(SCHEMA_VALIDATED, false);
                ctx.report_fault(format!("history schema validation failed: {e}"));
            }
        }
    }

    fn flush(&mut self, ctx: &mut ServiceContext) {
        if let Err(e) = self.insert_pending() {
            warn!(
                candles = self.pending.len(),
                error = %e,
                "Dropping history candles that could not be flushed"
            );
            self.pending.clear();
            self.counter = 0;
        }
        ctx.set_flag(SCHEMA_VALIDATED, false);
        ctx.set_flag(FLUSHED, true);
    }
}

impl<S: HistoryStore> Serviceable for HistoryWriter<S> {
    fn configure(&self, rules: &mut ServiceRules<'_>) -> Result<(), ServiceError> {
        rules.configure(StateKey::Starting, Statuses::all([SCHEMA_VALIDATED]))?;
        rules.configure(StateKey::Started, Statuses::all([SCHEMA_VALIDATED]))?;
        rules.configure(StateKey::Repairing, Statuses::all([SCHEMA_VALIDATED]))?;
        rules.configure(StateKey::Idling, Statuses::all([NO_TAGS]))?;
        rules.configure(StateKey::Yielding, Statuses::all([STORE_BUSY]))?;
        rules.configure(StateKey::Stopping, Statuses::all([FLUSHED]))?;
        rules.configure(StateKey::Evacuating, Statuses::all([FLUSHED]))?;
        Ok(())
    }

    fn on_exit(&mut self, transition: &Transition, _ctx: &mut ServiceContext) {
        if transition.from == ServiceState::Started(Activity::Active) {
            self.sampling = false;
        }
    }

    fn on_enter(&mut self, transition: &Transition, ctx: &mut ServiceContext) {
        match transition.to {
            ServiceState::Starting | ServiceState::Repairing => self.validate(ctx),
            ServiceState::Started(Activity::Active) => self.sampling = true,
            ServiceState::Stopping | ServiceState::Evacuating => self.flush(ctx),
            ServiceState::Stopped => ctx.set_flag(FLUSHED, false),
            ServiceState::Broken => ctx.set_flag(SCHEMA_VALIDATED, false),
            ServiceState::Started(_) => {}
        }
    }
}
