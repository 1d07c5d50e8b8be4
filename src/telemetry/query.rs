//! Telemetry query service: ordered, filtered and paginated views over a store.
//!
//! A read-only view borrowing a [`TelemetryStore`], in the same spirit as a stats
//! engine over a logging database. Empty results are `Ok(vec![])`; only store
//! failures are errors.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::config::QueryConfig;
use crate::core::errors::Result;
use crate::telemetry::record::{Operation, StoredRecord};
use crate::telemetry::store::{RecordQuery, SortOrder, TelemetryStore};

/// Page size used when the caller asks for zero or fewer rows.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Largest page size a caller can get.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A page request after coercion into bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u64,
    pub page_size: u32,
}

impl Pagination {
    /// Coerce raw input: `page <= 0` becomes 1, `page_size <= 0` becomes
    /// `default_size`, and `page_size > max_size` becomes `max_size`.
    /// Out-of-range input is never an error.
    #[must_use]
    pub fn coerce(page: i64, page_size: i64, default_size: u32, max_size: u32) -> Self {
        let page = u64::try_from(page).ok().filter(|&p| p > 0).unwrap_or(1);
        let page_size = if page_size <= 0 {
            default_size
        } else {
            u32::try_from(page_size).map_or(max_size, |s| s.min(max_size))
        };
        Self { page, page_size }
    }

    /// Rows to skip before this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(u64::from(self.page_size))
    }
}

/// Aggregate duration figures for one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSummary {
    pub operation: String,
    pub count: u64,
    pub total_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
}

/// Read-only query service over a telemetry store.
pub struct TelemetryQueries<'a> {
    store: &'a dyn TelemetryStore,
    default_page_size: u32,
    max_page_size: u32,
}

impl<'a> TelemetryQueries<'a> {
    /// Query service with the standard pagination bounds (10 / 100).
    pub fn new(store: &'a dyn TelemetryStore) -> Self {
        Self {
            store,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Query service with pagination bounds from configuration.
    pub fn with_config(store: &'a dyn TelemetryStore, config: &QueryConfig) -> Self {
        Self {
            store,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Every record, slowest first.
    pub fn list_descending(&self) -> Result<Vec<StoredRecord>> {
        self.store.select(&RecordQuery::ordered(SortOrder::Descending))
    }

    /// Every record, fastest first.
    pub fn list_ascending(&self) -> Result<Vec<StoredRecord>> {
        self.store.select(&RecordQuery::ordered(SortOrder::Ascending))
    }

    /// Records for exactly `operation`, slowest first, skipping zero durations.
    ///
    /// Zero-duration records are the ones whose duration could not be parsed, so
    /// they are noise for per-operation analysis.
    pub fn list_by_operation(&self, operation: &str) -> Result<Vec<StoredRecord>> {
        self.store.select(&RecordQuery {
            order: SortOrder::Descending,
            operation: Some(operation.to_string()),
            exclude_zero_duration: true,
            ..RecordQuery::default()
        })
    }

    /// One page of the slowest-first listing. Past the end is an empty page.
    pub fn list_paginated(&self, page: i64, page_size: i64) -> Result<Vec<StoredRecord>> {
        self.list_page(self.paginate(page, page_size))
    }

    /// Coerce raw page input with this service's bounds.
    #[must_use]
    pub fn paginate(&self, page: i64, page_size: i64) -> Pagination {
        Pagination::coerce(page, page_size, self.default_page_size, self.max_page_size)
    }

    pub fn list_page(&self, pagination: Pagination) -> Result<Vec<StoredRecord>> {
        self.store.select(&RecordQuery {
            order: SortOrder::Descending,
            limit: Some(pagination.page_size),
            offset: pagination.offset(),
            ..RecordQuery::default()
        })
    }

    /// Per-operation totals over records with a known duration.
    ///
    /// Vocabulary operations come first in their canonical order, then any
    /// other operation strings alphabetically.
    #[allow(clippy::cast_precision_loss)]
    pub fn operation_summary(&self) -> Result<Vec<OperationSummary>> {
        let rows = self.store.select(&RecordQuery {
            exclude_zero_duration: true,
            ..RecordQuery::default()
        })?;

        let mut by_op: BTreeMap<(u8, String), (u64, f64, f64)> = BTreeMap::new();
        for row in &rows {
            let rank = row
                .record
                .operation_kind()
                .map_or(u8::MAX, |op| op as u8);
            let entry = by_op
                .entry((rank, row.record.operation.clone()))
                .or_insert((0, 0.0, 0.0));
            entry.0 += 1;
            entry.1 += row.record.duration_ms;
            entry.2 = entry.2.max(row.record.duration_ms);
        }

        Ok(by_op
            .into_iter()
            .map(|((_, operation), (count, total_ms, max_ms))| OperationSummary {
                operation,
                count,
                total_ms,
                max_ms,
                mean_ms: total_ms / count as f64,
            })
            .collect())
    }
}

/// Parse a CLI or query-string operation argument into its stored spelling.
///
/// Vocabulary keywords are accepted in any case; anything else is matched
/// verbatim so fallback strings such as `SELECTSELECT` stay reachable.
#[must_use]
pub fn normalize_operation_arg(raw: &str) -> String {
    raw.parse::<Operation>()
        .map_or_else(|_| raw.trim().to_string(), |op| op.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::record::TelemetryRecord;
    use crate::telemetry::store::MemoryTelemetryStore;

    fn rec(duration_ms: f64, operation: &str) -> TelemetryRecord {
        TelemetryRecord {
            date: "2024/01/01".to_string(),
            time: "00:00:00".to_string(),
            duration_ms,
            operation: operation.to_string(),
        }
    }

    fn seeded(durations: &[f64]) -> MemoryTelemetryStore {
        let store = MemoryTelemetryStore::new();
        for &d in durations {
            store.insert(&rec(d, "SELECT")).unwrap();
        }
        store
    }

    fn durations(rows: &[StoredRecord]) -> Vec<f64> {
        rows.iter().map(|r| r.record.duration_ms).collect()
    }

    #[test]
    fn empty_store_returns_empty_lists() {
        let store = MemoryTelemetryStore::new();
        let q = TelemetryQueries::new(&store);
        assert!(q.list_descending().unwrap().is_empty());
        assert!(q.list_ascending().unwrap().is_empty());
        assert!(q.list_by_operation("SELECT").unwrap().is_empty());
        assert!(q.list_paginated(1, 10).unwrap().is_empty());
        assert!(q.operation_summary().unwrap().is_empty());
    }

    #[test]
    fn descending_and_ascending() {
        let store = seeded(&[4.0, 9.0, 1.0]);
        let q = TelemetryQueries::new(&store);
        assert_eq!(durations(&q.list_descending().unwrap()), vec![9.0, 4.0, 1.0]);
        assert_eq!(durations(&q.list_ascending().unwrap()), vec![1.0, 4.0, 9.0]);
    }

    #[test]
    fn by_operation_scenario() {
        let store = MemoryTelemetryStore::new();
        for (d, op) in [(5.0, "SELECT"), (0.0, "SELECT"), (20.0, "INSERT"), (15.0, "SELECT")] {
            store.insert(&rec(d, op)).unwrap();
        }
        let q = TelemetryQueries::new(&store);
        let rows = q.list_by_operation("SELECT").unwrap();
        assert_eq!(durations(&rows), vec![15.0, 5.0]);
        assert!(rows.iter().all(|r| r.record.operation == "SELECT"));
    }

    #[test]
    fn pagination_coercion() {
        assert_eq!(Pagination::coerce(0, 10, 10, 100), Pagination { page: 1, page_size: 10 });
        assert_eq!(Pagination::coerce(-3, 10, 10, 100).page, 1);
        assert_eq!(Pagination::coerce(1, 500, 10, 100).page_size, 100);
        assert_eq!(Pagination::coerce(1, -5, 10, 100).page_size, 10);
        assert_eq!(Pagination::coerce(1, 0, 10, 100).page_size, 10);
        assert_eq!(Pagination::coerce(1, i64::MAX, 10, 100).page_size, 100);
        assert_eq!(Pagination::coerce(3, 25, 10, 100).offset(), 50);
        assert_eq!(Pagination::coerce(i64::MAX, 100, 10, 100).offset(), u64::MAX);
    }

    #[test]
    fn paginated_pages_partition_listing() {
        let all: Vec<f64> = (0..25).map(f64::from).collect();
        let store = seeded(&all);
        let q = TelemetryQueries::new(&store);

        let page1 = q.list_paginated(1, 10).unwrap();
        let page2 = q.list_paginated(2, 10).unwrap();
        let page3 = q.list_paginated(3, 10).unwrap();
        assert_eq!(page1.len(), 10);
        assert_eq!(page2.len(), 10);
        assert_eq!(page3.len(), 5);

        let joined: Vec<i64> = page1.iter().chain(&page2).chain(&page3).map(|r| r.id).collect();
        let full: Vec<i64> = q.list_descending().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(joined, full);

        assert!(q.list_paginated(4, 10).unwrap().is_empty());
    }

    #[test]
    fn coerced_requests_match_their_canonical_form() {
        let all: Vec<f64> = (0..150).map(f64::from).collect();
        let store = seeded(&all);
        let q = TelemetryQueries::new(&store);
        assert_eq!(q.list_paginated(0, 10).unwrap(), q.list_paginated(1, 10).unwrap());
        assert_eq!(q.list_paginated(1, 500).unwrap(), q.list_paginated(1, 100).unwrap());
        assert_eq!(q.list_paginated(1, -5).unwrap(), q.list_paginated(1, 10).unwrap());
        assert_eq!(q.list_paginated(1, 500).unwrap().len(), 100);
    }

    #[test]
    fn config_bounds_apply() {
        let store = seeded(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let cfg = QueryConfig {
            default_page_size: 2,
            max_page_size: 3,
        };
        let q = TelemetryQueries::with_config(&store, &cfg);
        assert_eq!(q.list_paginated(1, 0).unwrap().len(), 2);
        assert_eq!(q.list_paginated(1, 50).unwrap().len(), 3);
    }

    #[test]
    fn summary_groups_and_orders() {
        let store = MemoryTelemetryStore::new();
        for (d, op) in [
            (5.0, "SELECT"),
            (0.0, "SELECT"),
            (20.0, "INSERT"),
            (15.0, "SELECT"),
            (2.0, "SELECTSELECT"),
            (1.0, ""),
        ] {
            store.insert(&rec(d, op)).unwrap();
        }
        let summary = TelemetryQueries::new(&store).operation_summary().unwrap();
        let ops: Vec<&str> = summary.iter().map(|s| s.operation.as_str()).collect();
        assert_eq!(ops, vec!["SELECT", "INSERT", "", "SELECTSELECT"]);

        let select = &summary[0];
        assert_eq!(select.count, 2);
        assert!((select.total_ms - 20.0).abs() < 1e-9);
        assert!((select.max_ms - 15.0).abs() < 1e-9);
        assert!((select.mean_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn operation_arg_normalization() {
        assert_eq!(normalize_operation_arg("select"), "SELECT");
        assert_eq!(normalize_operation_arg("SELECTSELECT"), "SELECTSELECT");
        assert_eq!(normalize_operation_arg(" delete "), "DELETE");
    }
}
