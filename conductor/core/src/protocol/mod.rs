//! Wire Protocol
//!
//! Newline-delimited JSON, UTF-8, one message per line, one direction only
//! (nothing is ever written back to the sender).
//!
//! ```text
//! bytes ──► LineDecoder ──► decode_line ──► InboundMessage ──► Session
//!           (framing)       (classify)      (typed, closed)
//! ```
//!
//! Message shapes:
//!
//! ```text
//! {"emotion_output": {"expression_type": "happy", "duration_ms": 3000, "trigger_reason": "..."}}
//! {"type": "asr", "text": "...", "isFinal": false}
//! {"type": "llm_stream", "text": "...", "isFinal": false}
//! ```

pub mod line;
pub mod message;

pub use line::{LineDecoder, LineError, DEFAULT_MAX_LINE_BYTES};
pub use message::{
    decode_line, DecodeError, InboundMessage, TextChunk, DEFAULT_DURATION_MS, TYPE_ASR,
    TYPE_LLM_STREAM,
};
