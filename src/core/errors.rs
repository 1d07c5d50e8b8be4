//! QT-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, QtError>;

/// Top-level error type for query telemetry.
#[derive(Debug, Error)]
pub enum QtError {
    #[error("[QT-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[QT-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[QT-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    /// A log entry too short to carry the date and time header.
    #[error("[QT-2001] malformed log entry at offset {offset}: {details}")]
    MalformedLogEntry { offset: u64, details: String },

    #[error("[QT-2002] no new log text since the last parse")]
    NoNewLogText,

    #[error("[QT-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    /// Failure reported by the storage engine holding telemetry records.
    #[error("[QT-2102] store failure in {context}: {details}")]
    Store {
        context: &'static str,
        details: String,
    },

    #[error("[QT-3002] io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl QtError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "QT-1001",
            Self::MissingConfig { .. } => "QT-1002",
            Self::ConfigParse { .. } => "QT-1003",
            Self::MalformedLogEntry { .. } => "QT-2001",
            Self::NoNewLogText => "QT-2002",
            Self::Serialization { .. } => "QT-2101",
            Self::Store { .. } => "QT-2102",
            Self::Io { .. } => "QT-3002",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// The telemetry core itself never retries; this is advice for callers.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Store { .. })
    }

    /// Whether the failure came from the storage engine rather than the log text.
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for QtError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for QtError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for QtError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
