//! Statement trace logger: the data-access layer's default logging facility.
//!
//! Each traced statement becomes one atomic sink append in the positional shape
//! the parser expects:
//!
//! ```text
//! \r\n2024/01/01 00:00:00 repo.rs:10
//! [12.500ms] [rows:1] SELECT * FROM books
//! ```
//!
//! Failed statements carry the error after the source location, and statements
//! slower than the threshold carry a `SLOW SQL >= ..` marker instead. Both push
//! the bracketed duration out of its usual token position, which the parser
//! treats as an unparsed duration.

#![allow(missing_docs)]

use std::time::Duration;

use chrono::{Local, NaiveDateTime};

use crate::sink::buffer::LogSink;

/// Prefix written before every entry.
pub const ENTRY_PREFIX: &str = "\r\n";

/// Default slow-statement threshold.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(200);

/// One executed statement as seen by the data-access layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    /// Source location of the call, e.g. `repo.rs:42`.
    pub source: String,
    pub elapsed: Duration,
    /// Rows affected or returned; negative when unknown.
    pub rows: i64,
    pub sql: String,
    pub error: Option<String>,
}

impl TraceEvent {
    #[must_use]
    pub fn new(source: impl Into<String>, elapsed: Duration, rows: i64, sql: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            elapsed,
            rows,
            sql: sql.into(),
            error: None,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Writes [`TraceEvent`]s into a [`LogSink`].
#[derive(Debug, Clone)]
pub struct TraceLogger {
    sink: LogSink,
    /// `None` disables the slow-statement shape.
    slow_threshold: Option<Duration>,
}

impl TraceLogger {
    #[must_use]
    pub fn new(sink: LogSink) -> Self {
        Self {
            sink,
            slow_threshold: Some(DEFAULT_SLOW_THRESHOLD),
        }
    }

    #[must_use]
    pub fn with_slow_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Trace a statement stamped with the local wall clock.
    pub fn trace(&self, event: &TraceEvent) -> u64 {
        self.trace_at(Local::now().naive_local(), event)
    }

    /// Trace a statement with an explicit timestamp. Returns the sink end offset.
    pub fn trace_at(&self, at: NaiveDateTime, event: &TraceEvent) -> u64 {
        self.sink.append(&self.format_entry(at, event))
    }

    /// Render one entry without appending it.
    #[must_use]
    pub fn format_entry(&self, at: NaiveDateTime, event: &TraceEvent) -> String {
        let header = match (&event.error, self.slow_threshold) {
            (Some(err), _) => format!("{} {err}", event.source),
            (None, Some(threshold)) if !threshold.is_zero() && event.elapsed > threshold => {
                format!(
                    "{} SLOW SQL >= {}ms",
                    event.source,
                    threshold.as_millis()
                )
            }
            _ => event.source.clone(),
        };
        let rows = if event.rows < 0 {
            "-".to_string()
        } else {
            event.rows.to_string()
        };
        format!(
            "{ENTRY_PREFIX}{} {header}\n[{:.3}ms] [rows:{rows}] {}\n",
            at.format("%Y/%m/%d %H:%M:%S"),
            event.elapsed.as_secs_f64() * 1_000.0,
            event.sql,
        )
    }
}
