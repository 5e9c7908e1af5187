//! Line Framing
//!
//! Splits an inbound byte stream into newline-delimited text lines.
//!
//! # Framing Rules
//!
//! ```text
//! {"type":"asr",...}\n{"emotion_output":...}\r\n\n{"type":"llm_s   <- partial, buffered
//! ```
//!
//! - Lines end at `\n`; trailing whitespace (including `\r`) is stripped
//! - Empty lines are dropped
//! - A partial line is buffered until its newline arrives
//! - A line longer than the limit is discarded up to its newline and
//!   reported once; framing resumes on the next line. Trailing whitespace
//!   does not count toward the limit

use thiserror::Error;

/// Default maximum line length in bytes (64 KiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Minimum buffer capacity for the decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Errors produced while framing lines
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    /// A line exceeded the configured maximum and was discarded
    #[error("Line too long: {len} bytes (max: {max})")]
    TooLong {
        /// Bytes seen when the limit was hit
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// A complete line was not valid UTF-8 and was discarded
    #[error("Line is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Incremental newline decoder
///
/// Buffers incoming bytes and yields complete, trimmed, non-empty lines.
#[derive(Debug)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Position we've consumed up to
    read_pos: usize,
    /// Maximum bytes in a single line
    max_line_bytes: usize,
    /// Skipping the remainder of an oversized line
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    /// Create a decoder with the given line limit
    #[must_use]
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet framed
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Whether the decoder is skipping an oversized line
    #[must_use]
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Try to decode the next line
    ///
    /// Returns:
    /// - `Ok(Some(line))` for a complete non-empty line
    /// - `Ok(None)` if more data is needed
    /// - `Err(LineError)` if a line was discarded; call again to continue
    pub fn decode(&mut self) -> Result<Option<String>, LineError> {
        loop {
            let pending = &self.buffer[self.read_pos..];
            let Some(newline) = pending.iter().position(|b| *b == b'\n') else {
                return self.check_partial();
            };

            let line_end = self.read_pos + newline;
            let line_start = self.read_pos;
            self.read_pos = line_end + 1;

            if self.discarding {
                // Tail of an oversized line; already reported
                self.discarding = false;
                continue;
            }

            let raw = &self.buffer[line_start..line_end];
            let len = content_len(raw);
            if len > self.max_line_bytes {
                return Err(LineError::TooLong {
                    len,
                    max: self.max_line_bytes,
                });
            }

            match frame_line(raw)? {
                Some(line) => return Ok(Some(line)),
                None => continue,
            }
        }
    }

    /// Flush a trailing line that never got its newline (at EOF)
    pub fn finish(&mut self) -> Result<Option<String>, LineError> {
        let raw = self.buffer[self.read_pos..].to_vec();
        let was_discarding = self.discarding;
        self.clear();

        if was_discarding {
            return Ok(None);
        }
        let len = content_len(&raw);
        if len > self.max_line_bytes {
            return Err(LineError::TooLong {
                len,
                max: self.max_line_bytes,
            });
        }
        frame_line(&raw)
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
        self.discarding = false;
    }

    /// Enforce the limit on an unterminated line
    fn check_partial(&mut self) -> Result<Option<String>, LineError> {
        let pending = &self.buffer[self.read_pos..];
        let len = content_len(pending);
        if self.discarding {
            // Nothing of an oversized line is worth keeping
            self.buffer.truncate(self.read_pos);
            return Ok(None);
        }
        // Trailing whitespace is not counted, but still bounded
        if len > self.max_line_bytes || pending.len() > self.max_line_bytes.saturating_mul(2) {
            self.buffer.truncate(self.read_pos);
            self.discarding = true;
            return Err(LineError::TooLong {
                len,
                max: self.max_line_bytes,
            });
        }
        Ok(None)
    }
}

/// Length of a raw line without its trailing whitespace
///
/// The line limit counts content bytes, so a `\r` before the newline never
/// pushes a line over it.
fn content_len(raw: &[u8]) -> usize {
    raw.iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |last| last + 1)
}

/// Trim and validate one raw line; `None` for blank lines
fn frame_line(raw: &[u8]) -> Result<Option<String>, LineError> {
    let text = std::str::from_utf8(raw).map_err(|e| LineError::InvalidUtf8(e.to_string()))?;
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}
