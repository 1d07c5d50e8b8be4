//! Trace-log parser: turns data-access trace text into [`TelemetryRecord`]s.
//!
//! The grammar is positional, matching the trace logger's entry shape:
//!
//! ```text
//! <date> <time> <source> [<duration>ms] [rows:<n>] <OPERATION> ...
//!   0      1       2          3             4          5
//! ```
//!
//! An entry spans every line from one date header up to the next, so the
//! two-line shape the trace logger writes is one entry. Positions are a policy,
//! not a guarantee: entries with a different shape (error text or a slow-query
//! marker after the source, truncated output) still parse, with degraded
//! fields rather than an error:
//!
//! - token 3 missing, without `ms`, or unreadable: duration is `0.0`
//!   (unreadable also logs a warning);
//! - token 5 missing or not an operation keyword: operation is every keyword
//!   seen in the entry, concatenated in order, possibly empty.
//!
//! Only an entry with fewer than two tokens fails, because it has no date and
//! time to report.

#![allow(missing_docs)]

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::config::ParserConfig;
use crate::core::errors::{QtError, Result};
use crate::sink::buffer::LogSink;
use crate::telemetry::record::{Operation, TelemetryRecord};

const DATE_TOKEN: usize = 0;
const TIME_TOKEN: usize = 1;
const DURATION_TOKEN: usize = 3;
const OPERATION_TOKEN: usize = 5;

/// Outcome of parsing one entry.
pub type ParseOutcome = Result<TelemetryRecord>;

fn ansi_pattern() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("ANSI pattern is valid"))
}

fn date_pattern() -> &'static Regex {
    static DATE: OnceLock<Regex> = OnceLock::new();
    DATE.get_or_init(|| Regex::new(r"^\d{4}/\d{2}/\d{2}$").expect("date pattern is valid"))
}

/// Remove ANSI color and style sequences.
#[must_use]
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ansi_pattern().replace_all(text, "")
}

// ──────────────────── tokenizing ────────────────────

/// Whitespace tokens of one entry plus the operation keywords seen among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens<'a> {
    pub tokens: Vec<&'a str>,
    /// Every operation keyword in encounter order, concatenated without separators.
    pub fallback_operation: String,
}

/// Split on whitespace, collecting operation keywords as they go by.
#[must_use]
pub fn tokenize(entry: &str) -> Tokens<'_> {
    let mut fallback_operation = String::new();
    let tokens = entry
        .split_whitespace()
        .inspect(|token| {
            if let Some(op) = Operation::from_token(token) {
                fallback_operation.push_str(op.as_str());
            }
        })
        .collect();
    Tokens {
        tokens,
        fallback_operation,
    }
}

/// Why a duration token could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurationTokenError {
    NoOpeningBracket,
    NoUnitAfterBracket,
    NotANumber(String),
    OutOfRange(String),
}

impl std::fmt::Display for DurationTokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoOpeningBracket => f.write_str("no '[' before the unit"),
            Self::NoUnitAfterBracket => f.write_str("no 'm' after the last '['"),
            Self::NotANumber(raw) => write!(f, "{raw:?} is not a number"),
            Self::OutOfRange(raw) => write!(f, "{raw:?} is not a finite non-negative duration"),
        }
    }
}

/// Read the millisecond value out of a token such as `[12.500ms]`.
///
/// Returns `None` when the token has no `ms` marker at all. Otherwise the value
/// is the text between the last `[` and the first `m` after it.
#[must_use]
pub fn duration_from_token(token: &str) -> Option<std::result::Result<f64, DurationTokenError>> {
    if !token.contains("ms") {
        return None;
    }
    let Some(open) = token.rfind('[') else {
        return Some(Err(DurationTokenError::NoOpeningBracket));
    };
    let rest = &token[open + 1..];
    let Some(unit) = rest.find('m') else {
        return Some(Err(DurationTokenError::NoUnitAfterBracket));
    };
    let raw = &rest[..unit];
    Some(match raw.parse::<f64>() {
        // `+ 0.0` turns `-0` into `0`.
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value + 0.0),
        Ok(_) => Err(DurationTokenError::OutOfRange(raw.to_string())),
        Err(_) => Err(DurationTokenError::NotANumber(raw.to_string())),
    })
}

// ──────────────────── entries ────────────────────

/// Whether `line` opens a new entry (its first token is a `YYYY/MM/DD` date).
#[must_use]
pub fn is_entry_header(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|first| date_pattern().is_match(&strip_ansi(first)))
}

/// Split text into entries, returning `(relative_offset, entry_text)` pairs.
///
/// A line whose first token is a `YYYY/MM/DD` date starts a new entry; other
/// lines continue the current one. Lines before the first header form an entry
/// of their own. Blank lines outside an entry are skipped.
#[must_use]
pub fn split_entries(text: &str) -> Vec<(usize, &str)> {
    let mut entries = Vec::new();
    let mut current: Option<usize> = None;
    let mut pos = 0;

    for line in text.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();

        if line.trim().is_empty() {
            continue;
        }
        match current {
            Some(start) if is_entry_header(line) => {
                entries.push((start, text[start..line_start].trim_end()));
                current = Some(line_start);
            }
            Some(_) => {}
            None => current = Some(line_start),
        }
    }
    if let Some(start) = current {
        entries.push((start, text[start..].trim_end()));
    }
    entries
}

/// Parse one entry. `offset` is only used to locate failures.
pub fn parse_entry(entry: &str, offset: u64) -> ParseOutcome {
    let Tokens {
        tokens,
        fallback_operation,
    } = tokenize(entry);

    if tokens.len() <= TIME_TOKEN {
        return Err(QtError::MalformedLogEntry {
            offset,
            details: format!(
                "expected date and time tokens, found {} token(s)",
                tokens.len()
            ),
        });
    }

    let duration_ms = match tokens.get(DURATION_TOKEN).and_then(|t| duration_from_token(t)) {
        Some(Ok(value)) => value,
        Some(Err(reason)) => {
            tracing::warn!(
                offset,
                token = tokens[DURATION_TOKEN],
                %reason,
                "could not read duration, recording 0.0"
            );
            0.0
        }
        None => 0.0,
    };

    let operation = tokens
        .get(OPERATION_TOKEN)
        .and_then(|t| Operation::from_token(t))
        .map_or(fallback_operation, |op| op.as_str().to_string());

    Ok(TelemetryRecord {
        date: tokens[DATE_TOKEN].to_string(),
        time: tokens[TIME_TOKEN].to_string(),
        duration_ms,
        operation,
    })
}

/// Apply the positional rules to a whole accumulated history as one entry.
///
/// This is how a parser without a cursor behaves: date and time come from the
/// oldest entry while the fallback operation spans everything ever logged.
/// Kept for comparing against stores populated that way.
pub fn parse_history(text: &str, strip: bool) -> ParseOutcome {
    let text = if strip {
        strip_ansi(text)
    } else {
        Cow::Borrowed(text)
    };
    parse_entry(&text, 0)
}

// ──────────────────── cursor-based parser ────────────────────

/// Parses entries appended to a [`LogSink`] since its last call.
///
/// The parser owns the sink's read side: consumed text is released back to the
/// sink, so one sink should feed one parser.
#[derive(Debug)]
pub struct TelemetryParser {
    sink: LogSink,
    cursor: u64,
    strip_ansi: bool,
}

impl TelemetryParser {
    /// Start reading from the oldest text still retained in `sink`.
    #[must_use]
    pub fn new(sink: LogSink) -> Self {
        Self {
            sink,
            cursor: 0,
            strip_ansi: true,
        }
    }

    #[must_use]
    pub fn from_config(sink: LogSink, config: &ParserConfig) -> Self {
        Self {
            strip_ansi: config.strip_ansi,
            ..Self::new(sink)
        }
    }

    #[must_use]
    pub fn with_strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    /// Ignore everything already in the sink.
    pub fn skip_to_end(&mut self) {
        self.cursor = self.sink.end_offset();
        self.sink.release(self.cursor);
    }

    /// Parse every complete entry appended since the last call, oldest first.
    pub fn parse_new(&mut self) -> Vec<ParseOutcome> {
        let read = self.sink.read_from(self.cursor);
        if read.skipped > 0 {
            tracing::warn!(
                skipped_bytes = read.skipped,
                "log sink evicted text before it was parsed"
            );
        }
        self.cursor = read.end;
        self.sink.release(read.end);

        split_entries(&read.text)
            .into_iter()
            .map(|(rel, entry)| {
                let offset = read.start + rel as u64;
                let entry = if self.strip_ansi {
                    strip_ansi(entry)
                } else {
                    Cow::Borrowed(entry)
                };
                let outcome = parse_entry(&entry, offset);
                match &outcome {
                    Ok(record) => tracing::debug!(
                        offset,
                        date = %record.date,
                        time = %record.time,
                        duration_ms = record.duration_ms,
                        operation = %record.operation,
                        "parsed telemetry entry"
                    ),
                    Err(err) => tracing::warn!(offset, %err, "skipping malformed log entry"),
                }
                outcome
            })
            .collect()
    }

    /// The record for the most recently logged operation.
    ///
    /// Consumes every new entry. Returns the newest well-formed one, the newest
    /// failure if none parsed, or [`QtError::NoNewLogText`] if nothing was new.
    pub fn parse_latest(&mut self) -> ParseOutcome {
        let mut latest_err = None;
        for outcome in self.parse_new().into_iter().rev() {
            match outcome {
                Ok(record) => return Ok(record),
                Err(err) => {
                    latest_err.get_or_insert(err);
                }
            }
        }
        Err(latest_err.unwrap_or(QtError::NoNewLogText))
    }
}
