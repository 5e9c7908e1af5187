//! Stream Channel Implementation
//!
//! One slow-arriving text stream revealed a few characters per tick.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::protocol::TextChunk;

// ============================================================================
// Configuration
// ============================================================================

/// Which text stream a channel carries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Live speech transcript (`asr`)
    Transcript,
    /// Generated reply (`llm_stream`)
    Reply,
}

impl StreamKind {
    /// Lowercase label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcript => "transcript",
            Self::Reply => "reply",
        }
    }
}

/// How received text becomes visible
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealMode {
    /// Each non-empty chunk replaces the displayed text at once
    #[default]
    Verbatim,
    /// Chunks queue up and are revealed a few characters per tick
    Paced,
}

impl RevealMode {
    /// Parse a mode name (case-insensitive)
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "verbatim" => Some(Self::Verbatim),
            "paced" => Some(Self::Paced),
            _ => None,
        }
    }
}

/// Pacer settings shared by both channels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacerConfig {
    /// Period of the reveal tick
    /// Default: 30ms
    pub tick: Duration,
    /// Characters revealed per tick
    pub chars_per_tick: usize,
    /// Most characters a channel may hold unrevealed
    pub max_pending_chars: usize,
    /// Reveal mode for the transcript (the reply is always paced)
    pub transcript_mode: RevealMode,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(30),
            chars_per_tick: 3,
            max_pending_chars: 64 * 1024,
            transcript_mode: RevealMode::Verbatim,
        }
    }
}

impl PacerConfig {
    /// Reveal mode used for `kind`
    #[must_use]
    pub fn mode_for(&self, kind: StreamKind) -> RevealMode {
        match kind {
            StreamKind::Transcript => self.transcript_mode,
            StreamKind::Reply => RevealMode::Paced,
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Per-channel counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Chunks received
    pub chunks_received: u64,
    /// Characters accepted into the channel
    pub chars_accepted: u64,
    /// Characters dropped by the pending cap
    pub chars_dropped: u64,
    /// Times a new message cleared a finished one
    pub resets: u64,
}

/// What the presenter must be told after a chunk
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// A finished message was cleared; present the empty text
    pub cleared: bool,
    /// Text to present immediately (verbatim mode)
    pub shown: Option<String>,
}

/// Buffered text stream for one channel
#[derive(Debug)]
pub struct StreamChannel {
    kind: StreamKind,
    mode: RevealMode,
    chars_per_tick: usize,
    max_pending_chars: usize,
    /// Received but not yet revealed
    pending: String,
    /// Character count of `pending`
    pending_chars: usize,
    /// Already handed to the presenter
    displayed: String,
    finished: bool,
    stats: StreamStats,
}

impl StreamChannel {
    /// Create an empty channel
    #[must_use]
    pub fn new(kind: StreamKind, config: &PacerConfig) -> Self {
        Self {
            kind,
            mode: config.mode_for(kind),
            chars_per_tick: config.chars_per_tick.max(1),
            max_pending_chars: config.max_pending_chars,
            pending: String::new(),
            pending_chars: 0,
            displayed: String::new(),
            finished: false,
            stats: StreamStats::default(),
        }
    }

    /// Which stream this is
    #[must_use]
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Reveal mode in use
    #[must_use]
    pub fn mode(&self) -> RevealMode {
        self.mode
    }

    /// Text shown so far
    #[must_use]
    pub fn displayed(&self) -> &str {
        &self.displayed
    }

    /// Text waiting to be revealed
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Characters waiting to be revealed
    #[must_use]
    pub fn pending_chars(&self) -> usize {
        self.pending_chars
    }

    /// Whether anything is waiting for a tick
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_chars > 0
    }

    /// Whether the current message ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Accept one chunk
    ///
    /// A non-empty chunk after a finished message starts a new message.
    pub fn on_chunk(&mut self, chunk: &TextChunk) -> ChunkOutcome {
        self.stats.chunks_received += 1;
        let mut outcome = ChunkOutcome::default();

        if self.finished && !chunk.text.is_empty() {
            self.reset();
            outcome.cleared = self.mode == RevealMode::Paced;
        }

        if !chunk.text.is_empty() {
            match self.mode {
                RevealMode::Paced => self.enqueue(&chunk.text),
                RevealMode::Verbatim => {
                    self.displayed = self.truncate(&chunk.text);
                    outcome.shown = Some(self.displayed.clone());
                }
            }
        }

        if chunk.is_final {
            self.finished = true;
        }
        outcome
    }

    /// Reveal the next characters; returns the full displayed text if any
    /// were moved
    pub fn tick(&mut self) -> Option<String> {
        if self.pending_chars == 0 {
            return None;
        }

        let take = self.chars_per_tick.min(self.pending_chars);
        let split = self
            .pending
            .char_indices()
            .nth(take)
            .map_or(self.pending.len(), |(idx, _)| idx);

        self.displayed.extend(self.pending.drain(..split));
        self.pending_chars -= take;
        Some(self.displayed.clone())
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.pending_chars = 0;
        self.displayed.clear();
        self.finished = false;
        self.stats.resets += 1;
    }

    fn enqueue(&mut self, text: &str) {
        let room = self.max_pending_chars.saturating_sub(self.pending_chars);
        let incoming = text.chars().count();
        let accepted = incoming.min(room);

        if accepted < incoming {
            let dropped = incoming - accepted;
            self.stats.chars_dropped += dropped as u64;
            warn!(
                channel = self.kind.as_str(),
                dropped,
                max = self.max_pending_chars,
                "Pending text cap reached, dropping characters"
            );
        }

        self.pending.extend(text.chars().take(accepted));
        self.pending_chars += accepted;
        self.stats.chars_accepted += accepted as u64;
    }

    fn truncate(&mut self, text: &str) -> String {
        let incoming = text.chars().count();
        if incoming <= self.max_pending_chars {
            self.stats.chars_accepted += incoming as u64;
            return text.to_string();
        }

        let dropped = incoming - self.max_pending_chars;
        self.stats.chars_accepted += self.max_pending_chars as u64;
        self.stats.chars_dropped += dropped as u64;
        warn!(
            channel = self.kind.as_str(),
            dropped,
            max = self.max_pending_chars,
            "Text exceeds cap, truncating"
        );
        text.chars().take(self.max_pending_chars).collect()
    }
}
