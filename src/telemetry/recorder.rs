//! Write path: after each data-access call, parse what it logged and store it.
//!
//! Parsing and inserting happen synchronously on the calling thread under one
//! lock, so concurrent callers each consume a distinct, consistent slice of the
//! sink. Telemetry failures are reported next to the data-access result, never
//! in place of it.

#![allow(missing_docs)]

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::errors::{QtError, Result};
use crate::sink::buffer::LogSink;
use crate::telemetry::parser::TelemetryParser;
use crate::telemetry::record::StoredRecord;
use crate::telemetry::store::TelemetryStore;

/// What one recording pass did.
#[derive(Debug, Default)]
pub struct RecordReport {
    /// Records inserted, oldest first.
    pub stored: Vec<StoredRecord>,
    /// Entries that could not be parsed.
    pub malformed: Vec<QtError>,
}

impl RecordReport {
    /// The record for the most recent operation, if one was stored.
    #[must_use]
    pub fn latest(&self) -> Option<&StoredRecord> {
        self.stored.last()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stored.is_empty() && self.malformed.is_empty()
    }
}

/// A data-access result paired with the telemetry recorded for it.
#[derive(Debug)]
pub struct Observed<T> {
    /// The data-access call's own outcome, untouched.
    pub value: T,
    /// Best-effort telemetry; a failure here says nothing about `value`.
    pub telemetry: Result<RecordReport>,
}

/// Parses new sink text and persists one record per entry.
pub struct TelemetryRecorder {
    parser: Mutex<TelemetryParser>,
    store: Arc<dyn TelemetryStore>,
}

impl TelemetryRecorder {
    #[must_use]
    pub fn new(parser: TelemetryParser, store: Arc<dyn TelemetryStore>) -> Self {
        Self {
            parser: Mutex::new(parser),
            store,
        }
    }

    /// Recorder reading `sink` from its oldest retained text.
    #[must_use]
    pub fn for_sink(sink: LogSink, store: Arc<dyn TelemetryStore>) -> Self {
        Self::new(TelemetryParser::new(sink), store)
    }

    /// The store records are written to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TelemetryStore> {
        &self.store
    }

    /// Parse everything new in the sink and insert each well-formed record.
    ///
    /// Malformed entries are collected in the report. A store failure stops the
    /// pass and is returned as-is; entries after it are not retried.
    pub fn record(&self) -> Result<RecordReport> {
        let mut parser = self.parser.lock();
        let mut report = RecordReport::default();
        for outcome in parser.parse_new() {
            match outcome {
                Ok(record) => report.stored.push(self.store.insert(&record)?),
                Err(err) => report.malformed.push(err),
            }
        }
        Ok(report)
    }

    /// Parse and store only the most recent operation's record.
    ///
    /// Older new entries are consumed without being stored.
    pub fn record_latest(&self) -> Result<StoredRecord> {
        let record = self.parser.lock().parse_latest()?;
        self.store.insert(&record)
    }

    /// Run a data-access call, then record the telemetry it produced.
    ///
    /// The report covers every entry pending in the sink when the pass runs.
    /// With concurrent callers on one sink, a caller's entry may land in another
    /// caller's report and its own report may be empty; each entry is still
    /// stored exactly once.
    pub fn observe<T, F>(&self, op: F) -> Observed<T>
    where
        F: FnOnce() -> T,
    {
        let value = op();
        let telemetry = self.record();
        if let Err(err) = &telemetry {
            tracing::warn!(code = err.code(), %err, "telemetry recording failed");
        }
        Observed { value, telemetry }
    }
}
