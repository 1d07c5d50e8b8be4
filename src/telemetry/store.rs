//! Telemetry store abstraction and the in-memory backend.
//!
//! A store is an append-only, insertion-ordered collection. It assigns each
//! record an increasing id and answers [`RecordQuery`]s sorted by duration with
//! ties always broken by id ascending, so equal durations keep insertion order
//! whichever direction is requested.

#![allow(missing_docs)]

use parking_lot::RwLock;

use crate::core::errors::Result;
use crate::telemetry::record::{StoredRecord, TelemetryRecord};

/// Duration sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Descending,
    Ascending,
}

/// Selection, ordering and windowing for [`TelemetryStore::select`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordQuery {
    pub order: SortOrder,
    /// Exact match on the stored operation string.
    pub operation: Option<String>,
    /// Drop records whose duration is exactly `0.0`.
    pub exclude_zero_duration: bool,
    /// `None` returns every matching row.
    pub limit: Option<u32>,
    pub offset: u64,
}

impl RecordQuery {
    #[must_use]
    pub fn ordered(order: SortOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    fn matches(&self, record: &TelemetryRecord) -> bool {
        self.operation
            .as_deref()
            .is_none_or(|op| record.operation == op)
            && !(self.exclude_zero_duration && record.duration_ms == 0.0)
    }
}

/// Persistence for telemetry records.
///
/// Inserts are atomic: a concurrent `select` sees a record fully or not at all.
pub trait TelemetryStore: Send + Sync {
    /// Append a record, returning it with its assigned identity.
    fn insert(&self, record: &TelemetryRecord) -> Result<StoredRecord>;

    /// Records matching `query`, ordered by duration then id.
    fn select(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>>;

    /// Number of stored records.
    fn count(&self) -> Result<u64>;
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Store backed by a vector behind a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryTelemetryStore {
    rows: RwLock<Vec<StoredRecord>>,
}

impl MemoryTelemetryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TelemetryStore for MemoryTelemetryStore {
    fn insert(&self, record: &TelemetryRecord) -> Result<StoredRecord> {
        let mut rows = self.rows.write();
        let id = rows.last().map_or(1, |last| last.id + 1);
        let stored = StoredRecord {
            id,
            recorded_at: now_rfc3339(),
            record: record.clone(),
        };
        rows.push(stored.clone());
        Ok(stored)
    }

    fn select(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>> {
        let mut matched: Vec<StoredRecord> = self
            .rows
            .read()
            .iter()
            .filter(|row| query.matches(&row.record))
            .cloned()
            .collect();

        // Rows are already in id order and sort_by is stable, so ties keep it.
        match query.order {
            SortOrder::Descending => {
                matched.sort_by(|a, b| duration_key(b).total_cmp(&duration_key(a)));
            }
            SortOrder::Ascending => {
                matched.sort_by(|a, b| duration_key(a).total_cmp(&duration_key(b)));
            }
        }

        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.rows.read().len() as u64)
    }
}

/// Sort key that treats `-0.0` and `0.0` as the same duration.
fn duration_key(row: &StoredRecord) -> f64 {
    row.record.duration_ms + 0.0
}
