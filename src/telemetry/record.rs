//! Telemetry record types.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Data-manipulation keyword recognized in trace text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Self; 4] = [Self::Select, Self::Insert, Self::Update, Self::Delete];

    /// Exact, case-sensitive match against a log token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "SELECT" => Some(Self::Select),
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive parse for user input such as CLI arguments.
impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(&s.trim().to_ascii_uppercase())
            .ok_or_else(|| format!("unknown operation {s:?} (expected SELECT, INSERT, UPDATE or DELETE)"))
    }
}

/// Structured outcome of parsing one trace entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// First token of the entry.
    pub date: String,
    /// Second token of the entry.
    pub time: String,
    /// Elapsed milliseconds; `0.0` when the entry carried no readable duration.
    #[serde(alias = "time_spent")]
    pub duration_ms: f64,
    /// Operation keyword, or the concatenated keywords seen in the entry, or empty.
    #[serde(alias = "sql")]
    pub operation: String,
}

impl TelemetryRecord {
    /// Whether a duration was actually recovered from the entry.
    #[must_use]
    pub fn has_duration(&self) -> bool {
        self.duration_ms != 0.0
    }

    /// The operation as a vocabulary member, if it is exactly one.
    #[must_use]
    pub fn operation_kind(&self) -> Option<Operation> {
        Operation::from_token(&self.operation)
    }
}

/// A persisted record with the identity the store assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Insertion-ordered key assigned by the store.
    pub id: i64,
    /// RFC 3339 UTC time the record was stored.
    pub recorded_at: String,
    #[serde(flatten)]
    pub record: TelemetryRecord,
}
