//! Append-only log sink shared between a logging facility and the parser.
//!
//! Text is addressed by absolute byte offsets that keep growing for the life of
//! the sink, so a reader can hold a cursor across appends and evictions. Readers
//! only ever see complete lines: anything after the last `\n` stays pending until
//! the writer finishes it.
//!
//! Retention is bounded. Consumed text is dropped by [`LogSink::release`], and
//! when unconsumed text exceeds the configured capacity the oldest whole lines
//! are evicted. A reader whose cursor falls behind an eviction is told how many
//! bytes it missed via [`SinkRead::skipped`].

#![allow(missing_docs)]

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Default retention bound (4 MiB).
pub const DEFAULT_MAX_RETAINED_BYTES: usize = 4 * 1024 * 1024;


#[derive(Debug)]
struct SinkState {
    text: String,
    /// Absolute offset of `text[0]`.
    base: u64,
    max_retained: usize,
    evicted_bytes: u64,
}

impl SinkState {
    fn end(&self) -> u64 {
        self.base + self.text.len() as u64
    }

    fn drop_front(&mut self, n: usize) {
        self.text.drain(..n);
        self.base += n as u64;
    }

    fn enforce_bound(&mut self) {
        if self.text.len() <= self.max_retained {
            return;
        }
        let excess = self.text.len() - self.max_retained;
        // Cut just past the first newline that frees at least `excess` bytes so
        // eviction never leaves a partial line at the front.
        let from = excess - 1;
        let cut = memchr::memchr(b'\n', &self.text.as_bytes()[from..])
            .map_or(self.text.len(), |pos| from + pos + 1);
        self.evicted_bytes += cut as u64;
        self.drop_front(cut);
    }
}

/// Snapshot of complete lines returned by [`LogSink::read_from`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRead {
    /// Complete lines between `start` and `end`.
    pub text: String,
    /// Absolute offset of `text[0]`.
    pub start: u64,
    /// Absolute offset just past the last returned byte; the next cursor.
    pub end: u64,
    /// Bytes evicted before this reader reached them.
    pub skipped: u64,
}

impl SinkRead {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Cheaply cloneable handle to a shared, mutex-guarded log buffer.
///
/// Every clone refers to the same buffer. Appends and reads are serialized by a
/// single lock, so a read always observes whole appends.
#[derive(Debug, Clone)]
pub struct LogSink {
    inner: Arc<Mutex<SinkState>>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETAINED_BYTES)
    }
}

impl LogSink {
    /// Create an empty sink retaining at most `max_retained_bytes` of text.
    #[must_use]
    pub fn new(max_retained_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkState {
                text: String::new(),
                base: 0,
                max_retained: max_retained_bytes.max(1),
                evicted_bytes: 0,
            })),
        }
    }

    /// Append one chunk of log text atomically. Returns the new end offset.
    pub fn append(&self, chunk: &str) -> u64 {
        let mut state = self.inner.lock();
        state.text.push_str(chunk);
        state.enforce_bound();
        state.end()
    }

    /// Offset just past the last byte ever appended.
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.inner.lock().end()
    }

    /// Bytes currently held in memory.
    #[must_use]
    pub fn retained_bytes(&self) -> usize {
        self.inner.lock().text.len()
    }

    /// Total bytes evicted by the retention bound so far.
    #[must_use]
    pub fn evicted_bytes(&self) -> u64 {
        self.inner.lock().evicted_bytes
    }

    /// Snapshot the complete lines appended at or after `cursor`.
    #[must_use]
    pub fn read_from(&self, cursor: u64) -> SinkRead {
        let state = self.inner.lock();
        let start = cursor.clamp(state.base, state.end());
        let skipped = start.saturating_sub(cursor);
        #[allow(clippy::cast_possible_truncation)]
        let pending = &state.text[(start - state.base) as usize..];
        let complete_len = memchr::memrchr(b'\n', pending.as_bytes()).map_or(0, |pos| pos + 1);
        SinkRead {
            text: pending[..complete_len].to_string(),
            start,
            end: start + complete_len as u64,
            skipped,
        }
    }

    /// Drop retained text before `upto`; the caller has consumed it.
    pub fn release(&self, upto: u64) {
        let mut state = self.inner.lock();
        let upto = upto.min(state.end());
        if upto <= state.base {
            return;
        }
        #[allow(clippy::cast_possible_truncation)]
        let n = (upto - state.base) as usize;
        // Offsets handed out by read_from always sit on line boundaries; anything
        // else is ignored rather than splitting a UTF-8 sequence.
        if state.text.is_char_boundary(n) {
            state.drop_front(n);
        }
    }

    /// An [`io::Write`] adapter for logging facilities that write byte streams.
    #[must_use]
    pub fn writer(&self) -> SinkWriter {
        SinkWriter {
            sink: self.clone(),
            pending: Vec::new(),
        }
    }
}

/// Buffers writes and appends every newline-terminated chunk to the sink.
///
/// Each `write` that completes a line pushes everything up to its last `\n` in
/// one atomic append. A trailing partial line waits for the next newline, a
/// flush, or drop.
#[derive(Debug)]
pub struct SinkWriter {
    sink: LogSink,
    pending: Vec<u8>,
}

impl SinkWriter {
    fn push(&mut self, len: usize) {
        let chunk: Vec<u8> = self.pending.drain(..len).collect();
        self.sink.append(&String::from_utf8_lossy(&chunk));
    }
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        if let Some(pos) = memchr::memrchr(b'\n', buf) {
            let keep = buf.len() - pos - 1;
            self.push(self.pending.len() - keep);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            self.push(self.pending.len());
        }
        Ok(())
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
