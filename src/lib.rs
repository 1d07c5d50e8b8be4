#![forbid(unsafe_code)]

//! Query telemetry (qtel): performance records extracted from data-access trace logs.
//!
//! The data-access layer logs each executed statement into a shared [`sink`].
//! After every data-access call the [`telemetry::recorder`] parses whatever was
//! appended since its last pass and stores one record per entry:
//!
//! 1. **Log sink**: bounded, mutex-guarded append log with reader cursors
//! 2. **Parser**: positional grammar over `<date> <time> <source> [<ms>ms] [rows:n] <OP> ...`
//! 3. **Store**: append-only SQLite table (or in-memory) with insertion-ordered ids
//! 4. **Queries**: slowest-first, fastest-first, per-operation and paginated views
//!
//! # Library usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use query_telemetry::prelude::*;
//!
//! let sink = LogSink::default();
//! let log = TraceLogger::new(sink.clone());
//! let store: Arc<dyn TelemetryStore> = Arc::new(MemoryTelemetryStore::new());
//! let recorder = TelemetryRecorder::for_sink(sink, Arc::clone(&store));
//!
//! let observed = recorder.observe(|| {
//!     log.trace(&TraceEvent::new("books.rs:12", Duration::from_millis(4), 1, "SELECT * FROM books"));
//! });
//! assert!(observed.telemetry.is_ok());
//!
//! let slowest = TelemetryQueries::new(store.as_ref()).list_paginated(1, 10)?;
//! # Ok::<(), QtError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod sink;
pub mod telemetry;
