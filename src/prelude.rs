//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use query_telemetry::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{QtError, Result};

// Sink
pub use crate::sink::buffer::{LogSink, SinkWriter};
pub use crate::sink::trace::{TraceEvent, TraceLogger};

// Telemetry
pub use crate::telemetry::parser::{TelemetryParser, parse_entry};
pub use crate::telemetry::query::{Pagination, TelemetryQueries};
pub use crate::telemetry::record::{Operation, StoredRecord, TelemetryRecord};
pub use crate::telemetry::recorder::{Observed, RecordReport, TelemetryRecorder};
#[cfg(feature = "sqlite")]
pub use crate::telemetry::sqlite::SqliteTelemetryStore;
pub use crate::telemetry::store::{MemoryTelemetryStore, TelemetryStore};
