//! Destinations for aggregated candles.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::candle::{Candle, CandleBatch};
use crate::error::HistoryError;

/// Where the writer puts its candles.
pub trait HistoryStore {
    /// Prepare the store to receive rows.
    fn validate_schema(&mut self) -> Result<(), HistoryError>;

    /// Persist one batch. Called with non-empty batches only.
    fn insert(&mut self, batch: &CandleBatch) -> Result<(), HistoryError>;

    /// Whether the store is still busy with earlier work.
    fn is_busy(&self) -> bool {
        false
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for Box<S> {
    fn validate_schema(&mut self) -> Result<(), HistoryError> {
        (**self).validate_schema()
    }

    fn insert(&mut self, batch: &CandleBatch) -> Result<(), HistoryError> {
        (**self).insert(batch)
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }
}

// ─── In-memory ──────────────────────────────────────────────────────

/// Keeps inserted batches in memory. Failure and busy states can be forced.
#[derive(Debug, Default)]
pub struct MemoryStore {
    batches: Vec<CandleBatch>,
    retain: Option<usize>,
    schema_error: Option<String>,
    insert_error: Option<String>,
    busy: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store keeping only the newest `retain` batches.
    pub fn bounded(retain: usize) -> Self {
        Self {
            retain: Some(retain),
            ..Self::default()
        }
    }

    /// Batches inserted so far, oldest first.
    pub fn batches(&self) -> &[CandleBatch] {
        &self.batches
    }

    /// Make `validate_schema` fail with `reason` (or succeed with `None`).
    pub fn set_schema_error(&mut self, reason: Option<&str>) {
        self.schema_error = reason.map(str::to_owned);
    }

    /// Make `insert` fail with `reason` (or succeed with `None`).
    pub fn set_insert_error(&mut self, reason: Option<&str>) {
        self.insert_error = reason.map(str::to_owned);
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }
}

impl HistoryStore for MemoryStore {
    fn validate_schema(&mut self) -> Result<(), HistoryError> {
        match &self.schema_error {
            Some(reason) => Err(HistoryError::SchemaInvalid(reason.clone())),
            None => Ok(()),
        }
    }

    fn insert(&mut self, batch: &CandleBatch) -> Result<(), HistoryError> {
        if let Some(reason) = &self.insert_error {
            return Err(HistoryError::Store(reason.clone()));
        }
        self.batches.push(batch.clone());
        if let Some(retain) = self.retain {
            let excess = self.batches.len().saturating_sub(retain);
            self.batches.drain(..excess);
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.busy
    }
}

// ─── JSON lines ─────────────────────────────────────────────────────

/// One stored row.
#[derive(Serialize)]
struct Row<'a, T: Serialize> {
    tag: &'a str,
    #[serde(flatten)]
    candle: &'a Candle<T>,
}

/// Appends one JSON object per tag and batch to a file.
///
/// Rows carry `tag`, `open`, `close`, `min`, `max`, `open_time`,
/// `close_time` and `count`. The file and its parent directory are
/// created by `validate_schema()`.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    out: Option<BufWriter<File>>,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            out: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonLinesStore {
    fn validate_schema(&mut self) -> Result<(), HistoryError> {
        if self.path.is_dir() {
            return Err(HistoryError::SchemaInvalid(format!(
                "{} is a directory",
                self.path.display()
            )));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.out = Some(BufWriter::new(file));
        info!(path = %self.path.display(), "History file opened");
        Ok(())
    }

    fn insert(&mut self, batch: &CandleBatch) -> Result<(), HistoryError> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| HistoryError::SchemaInvalid("history file not opened".to_string()))?;

        write_rows(out, &batch.bools)?;
        write_rows(out, &batch.ints)?;
        write_rows(out, &batch.reals)?;
        out.flush()?;

        debug!(path = %self.path.display(), rows = batch.len(), "History rows appended");
        Ok(())
    }
}

fn write_rows<T: Serialize>(
    out: &mut impl Write,
    candles: &BTreeMap<String, Candle<T>>,
) -> Result<(), HistoryError> {
    for (tag, candle) in candles {
        serde_json::to_writer(&mut *out, &Row { tag: tag.as_str(), candle })?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::Sample;
    use chrono::{TimeZone, Utc};

    fn batch() -> CandleBatch {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut batch = CandleBatch::new();
        batch.add("pump", Sample::Bool(true), at);
        batch.add("level", Sample::Int(3), at);
        batch.add("level", Sample::Int(-1), at);
        batch
    }

    #[test]
    fn memory_store_keeps_batches() {
        let mut store = MemoryStore::new();
        store.validate_schema().unwrap();
        store.insert(&batch()).unwrap();
        assert_eq!(store.batches().len(), 1);

        store.set_insert_error(Some("disk full"));
        assert!(matches!(store.insert(&batch()), Err(HistoryError::Store(_))));
        assert_eq!(store.batches().len(), 1);
    }

    #[test]
    fn bounded_memory_store_drops_oldest() {
        let mut store = MemoryStore::bounded(2);
        for level in 0..3 {
            let mut b = CandleBatch::new();
            b.add("level", Sample::Int(level), Utc::now());
            store.insert(&b).unwrap();
        }
        let opens: Vec<_> = store.batches().iter().map(|b| b.ints["level"].open).collect();
        assert_eq!(opens, vec![1, 2]);
    }

    #[test]
    fn memory_store_forced_schema_error() {
        let mut store = MemoryStore::new();
        store.set_schema_error(Some("missing table"));
        assert!(matches!(
            store.validate_schema(),
            Err(HistoryError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn json_lines_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");
        let mut store = JsonLinesStore::new(&path);

        assert!(matches!(
            store.insert(&batch()),
            Err(HistoryError::SchemaInvalid(_))
        ));

        store.validate_schema().unwrap();
        store.insert(&batch()).unwrap();
        store.insert(&batch()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let rows: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0]["tag"], "pump");
        assert_eq!(rows[1]["tag"], "level");
        assert_eq!(rows[1]["open"], 3);
        assert_eq!(rows[1]["min"], -1);
        assert_eq!(rows[1]["count"], 2);
        assert!(rows[1]["open_time"].is_string());
    }

    #[test]
    fn json_lines_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonLinesStore::new(dir.path());
        assert!(matches!(
            store.validate_schema(),
            Err(HistoryError::SchemaInvalid(_))
        ));
    }
}
