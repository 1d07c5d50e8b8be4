//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{QtError, Result};

/// Hard ceiling on the page size a config may allow.
const PAGE_SIZE_CEILING: u32 = 10_000;

/// Full qtel configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub sink: SinkConfig,
    pub parser: ParserConfig,
    pub query: QueryConfig,
}

/// Filesystem paths used by qtel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub sqlite_db: PathBuf,
}

/// Retention bounds for the in-memory log sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SinkConfig {
    /// Unconsumed text beyond this many bytes is evicted oldest-first.
    pub max_retained_bytes: usize,
}

/// Trace-log parsing knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParserConfig {
    /// Strip ANSI color sequences (colorful loggers) before tokenizing.
    pub strip_ansi: bool,
}

/// Pagination bounds for the query service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size used when the caller asks for zero or fewer rows.
    pub default_page_size: u32,
    /// Page sizes above this are clamped down to it.
    pub max_page_size: u32,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                tracing::warn!("HOME not set, falling back to /tmp for data paths");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("qtel").join("config.toml"),
            sqlite_db: home_dir
                .join(".local")
                .join("share")
                .join("qtel")
                .join("telemetry.sqlite3"),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_retained_bytes: 4 * 1024 * 1024,
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { strip_ansi: true }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| QtError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Self::from_toml_str(&raw)?
        } else if is_explicit_path {
            return Err(QtError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document; absent sections and keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Deterministic hash of the effective config for diagnostics.
    ///
    /// FNV-1a over canonical JSON, stable across processes and toolchains.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("QTEL_SQLITE_DB") {
            self.paths.sqlite_db = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("QTEL_SINK_MAX_RETAINED_BYTES") {
            self.sink.max_retained_bytes = parse_env("QTEL_SINK_MAX_RETAINED_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("QTEL_PARSER_STRIP_ANSI") {
            self.parser.strip_ansi = parse_env("QTEL_PARSER_STRIP_ANSI", &raw)?;
        }
        if let Some(raw) = lookup("QTEL_QUERY_DEFAULT_PAGE_SIZE") {
            self.query.default_page_size = parse_env("QTEL_QUERY_DEFAULT_PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("QTEL_QUERY_MAX_PAGE_SIZE") {
            self.query.max_page_size = parse_env("QTEL_QUERY_MAX_PAGE_SIZE", &raw)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sink.max_retained_bytes == 0 {
            return Err(QtError::InvalidConfig {
                details: "sink.max_retained_bytes must be > 0".to_string(),
            });
        }
        if self.query.default_page_size == 0 {
            return Err(QtError::InvalidConfig {
                details: "query.default_page_size must be > 0".to_string(),
            });
        }
        if self.query.default_page_size > self.query.max_page_size {
            return Err(QtError::InvalidConfig {
                details: format!(
                    "query.default_page_size ({}) must not exceed query.max_page_size ({})",
                    self.query.default_page_size, self.query.max_page_size
                ),
            });
        }
        if self.query.max_page_size > PAGE_SIZE_CEILING {
            return Err(QtError::InvalidConfig {
                details: format!(
                    "query.max_page_size must be <= {PAGE_SIZE_CEILING}, got {}",
                    self.query.max_page_size
                ),
            });
        }
        if self.paths.sqlite_db.as_os_str().is_empty() {
            return Err(QtError::InvalidConfig {
                details: "paths.sqlite_db must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| QtError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
