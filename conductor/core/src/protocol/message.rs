//! Inbound Message Decoding
//!
//! Turns one framed line into a typed [`InboundMessage`]. This is the only
//! place wire defaults are applied; everything downstream sees explicit
//! values.
//!
//! # Classification
//!
//! | `type` field      | Result                                  |
//! |-------------------|-----------------------------------------|
//! | `"asr"`           | [`InboundMessage::Transcript`]          |
//! | `"llm_stream"`    | [`InboundMessage::Reply`]               |
//! | absent / other    | `emotion_output` envelope, else `Inert` |

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::expression::{EmotionCommand, ExpressionState};

/// Duration applied when an emotion envelope omits `duration_ms`
pub const DEFAULT_DURATION_MS: i64 = 3000;

/// Wire `type` for transcript updates
pub const TYPE_ASR: &str = "asr";

/// Wire `type` for reply token chunks
pub const TYPE_LLM_STREAM: &str = "llm_stream";

/// Errors that make a line malformed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The line is not valid JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// A known field has the wrong type
    #[error("Invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name on the wire
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

/// One fragment of streamed text
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TextChunk {
    /// Text fragment (may be empty)
    pub text: String,
    /// End of the logical message
    pub is_final: bool,
}

impl TextChunk {
    /// Create a new chunk
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
        }
    }
}

/// A decoded inbound line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundMessage {
    /// Change the expression
    Emotion(EmotionCommand),
    /// Live transcript update (`type: "asr"`)
    Transcript(TextChunk),
    /// Generated reply chunk (`type: "llm_stream"`)
    Reply(TextChunk),
    /// Valid JSON that carries nothing actionable
    Inert,
}

impl InboundMessage {
    /// Whether this message counts as an interaction (resets the idle timer)
    #[must_use]
    pub fn is_interaction(&self) -> bool {
        !matches!(self, Self::Inert)
    }

    /// Short label for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Emotion(_) => "emotion",
            Self::Transcript(_) => "transcript",
            Self::Reply(_) => "reply",
            Self::Inert => "inert",
        }
    }
}

#[derive(Deserialize)]
struct StreamChunkWire {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "isFinal")]
    is_final_camel: Option<bool>,
    #[serde(default, rename = "is_final")]
    is_final_snake: Option<bool>,
}

#[derive(Deserialize)]
struct EmotionOutputWire {
    #[serde(default)]
    expression_type: Option<String>,
    #[serde(default)]
    duration_ms: Option<i64>,
    #[serde(default)]
    trigger_reason: Option<String>,
}

/// Decode one framed line
///
/// # Errors
///
/// Returns `DecodeError` if the line is not JSON or a recognized field has
/// the wrong type. Unrecognized shapes decode to [`InboundMessage::Inert`].
pub fn decode_line(line: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    match value.get("type").and_then(Value::as_str) {
        Some(TYPE_ASR) => decode_chunk(value).map(InboundMessage::Transcript),
        Some(TYPE_LLM_STREAM) => decode_chunk(value).map(InboundMessage::Reply),
        _ => decode_emotion(&value),
    }
}

fn decode_chunk(value: Value) -> Result<TextChunk, DecodeError> {
    let wire: StreamChunkWire = serde_json::from_value(value).map_err(|e| {
        DecodeError::InvalidField {
            field: "text/isFinal",
            reason: e.to_string(),
        }
    })?;

    Ok(TextChunk {
        text: wire.text.unwrap_or_default(),
        is_final: wire.is_final_camel.or(wire.is_final_snake).unwrap_or(false),
    })
}

fn decode_emotion(value: &Value) -> Result<InboundMessage, DecodeError> {
    let Some(envelope) = value.get("emotion_output") else {
        return Ok(InboundMessage::Inert);
    };
    if !envelope.is_object() {
        return Ok(InboundMessage::Inert);
    }

    let wire = EmotionOutputWire::deserialize(envelope).map_err(|e| {
        DecodeError::InvalidField {
            field: "emotion_output",
            reason: e.to_string(),
        }
    })?;

    let Some(expression_type) = wire.expression_type.filter(|s| !s.trim().is_empty()) else {
        return Ok(InboundMessage::Inert);
    };

    Ok(InboundMessage::Emotion(EmotionCommand {
        target: ExpressionState::from_name(&expression_type),
        duration_ms: wire.duration_ms.unwrap_or(DEFAULT_DURATION_MS),
        trigger_reason: wire.trigger_reason.unwrap_or_default(),
    }))
}
