//! Query telemetry: parse trace text into records, persist them, query them back.

pub mod parser;
pub mod query;
pub mod record;
pub mod recorder;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
