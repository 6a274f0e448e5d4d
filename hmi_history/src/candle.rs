//! Aggregated samples.
//!
//! A [`Candle`] summarizes every sample of one tag taken during one
//! batch: the first and last value with their timestamps, the extremes and
//! the number of samples. A [`CandleBatch`] holds the candles of all tags
//! until they are handed to a store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sampled tag value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    Bool(bool),
    Int(i32),
    Real(f64),
}

/// Open/close/min/max summary of one tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle<T> {
    pub open: T,
    pub close: T,
    pub min: T,
    pub max: T,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub count: u32,
}

impl<T: Copy + PartialOrd> Candle<T> {
    /// Candle opened by its first sample.
    pub fn new(value: T, at: DateTime<Utc>) -> Self {
        Self {
            open: value,
            close: value,
            min: value,
            max: value,
            open_time: at,
            close_time: at,
            count: 1,
        }
    }

    /// Fold one more sample in.
    pub fn add(&mut self, value: T, at: DateTime<Utc>) {
        self.close = value;
        self.close_time = at;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        self.count = self.count.saturating_add(1);
    }
}

/// Candles of every tag, split by value type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleBatch {
    pub bools: BTreeMap<String, Candle<bool>>,
    pub ints: BTreeMap<String, Candle<i32>>,
    pub reals: BTreeMap<String, Candle<f64>>,
}

impl CandleBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sample` for `tag`.
    pub fn add(&mut self, tag: &str, sample: Sample, at: DateTime<Utc>) {
        match sample {
            Sample::Bool(v) => fold(&mut self.bools, tag, v, at),
            Sample::Int(v) => fold(&mut self.ints, tag, v, at),
            Sample::Real(v) => fold(&mut self.reals, tag, v, at),
        }
    }

    /// Number of candles, one per tag and type.
    pub fn len(&self) -> usize {
        self.bools.len() + self.ints.len() + self.reals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.bools.clear();
        self.ints.clear();
        self.reals.clear();
    }
}

fn fold<T: Copy + PartialOrd>(
    candles: &mut BTreeMap<String, Candle<T>>,
    tag: &str,
    value: T,
    at: DateTime<Utc>,
) {
    match candles.get_mut(tag) {
        Some(candle) => candle.add(value, at),
        None => {
            candles.insert(tag.to_owned(), Candle::new(value, at));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap()
    }

    #[test]
    fn candle_tracks_extremes() {
        let mut candle = Candle::new(5, at(0));
        for (i, v) in [3, 9, 7].into_iter().enumerate() {
            candle.add(v, at(i as u32 + 1));
        }
        assert_eq!(candle.open, 5);
        assert_eq!(candle.close, 7);
        assert_eq!(candle.min, 3);
        assert_eq!(candle.max, 9);
        assert_eq!(candle.open_time, at(0));
        assert_eq!(candle.close_time, at(3));
        assert_eq!(candle.count, 4);
    }

    #[test]
    fn bool_candle() {
        let mut candle = Candle::new(true, at(0));
        candle.add(false, at(1));
        candle.add(true, at(2));
        assert!(!candle.min);
        assert!(candle.max);
        assert!(candle.close);
    }

    #[test]
    fn batch_routes_by_type() {
        let mut batch = CandleBatch::new();
        batch.add("pump", Sample::Bool(true), at(0));
        batch.add("level", Sample::Int(40), at(0));
        batch.add("level", Sample::Int(42), at(1));
        batch.add("setpoint", Sample::Real(21.5), at(0));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.ints["level"].count, 2);
        assert_eq!(batch.ints["level"].close, 42);
        assert_eq!(batch.reals["setpoint"].open, 21.5);

        batch.clear();
        assert!(batch.is_empty());
    }
}
