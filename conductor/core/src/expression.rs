//! Expression States and Emotion Commands
//!
//! The face shows exactly one [`ExpressionState`] at a time. Upstream
//! components change it by sending an `emotion_output` envelope, which the
//! protocol layer decodes into an [`EmotionCommand`].
//!
//! # Name Mapping
//!
//! Expression names are matched case-insensitively, in English or in the
//! localized terms the device UI uses. Anything unrecognized maps to
//! [`ExpressionState::Normal`]; an unknown name is never an error.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Visible mode of the face
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionState {
    /// Resting face
    #[default]
    Normal,
    /// Smiling
    Happy,
    /// Downcast
    Sad,
    /// Alert/warning face (no blinking)
    Warning,
    /// Eyes closed (no blinking)
    Sleep,
}

impl ExpressionState {
    /// All states, in declaration order
    pub const ALL: [Self; 5] = [
        Self::Normal,
        Self::Happy,
        Self::Sad,
        Self::Warning,
        Self::Sleep,
    ];

    /// Map an `expression_type` string to a state
    ///
    /// Unrecognized names map to `Normal`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self::parse_known(name).unwrap_or(Self::Normal)
    }

    /// Map a name to a state, returning `None` when it is not recognized
    #[must_use]
    pub fn parse_known(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "normal" | "neutral" | "正常" | "中性" => Some(Self::Normal),
            "happy" | "开心" | "高兴" => Some(Self::Happy),
            "sad" | "难过" | "悲伤" => Some(Self::Sad),
            "warning" | "警告" | "警觉" => Some(Self::Warning),
            "sleep" | "睡眠" | "睡觉" => Some(Self::Sleep),
            _ => None,
        }
    }

    /// Whether periodic blinking is suppressed while in this state
    #[must_use]
    pub fn suppresses_blink(self) -> bool {
        matches!(self, Self::Warning | Self::Sleep)
    }

    /// Lowercase wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Warning => "warning",
            Self::Sleep => "sleep",
        }
    }
}

impl fmt::Display for ExpressionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to change the expression, decoded from one inbound line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmotionCommand {
    /// Target state
    pub target: ExpressionState,
    /// Commanded duration in milliseconds (`<= 0` = permanent)
    pub duration_ms: i64,
    /// Why upstream sent this (diagnostics only)
    pub trigger_reason: String,
}

impl EmotionCommand {
    /// Create a new command
    pub fn new(target: ExpressionState, duration_ms: i64, trigger_reason: impl Into<String>) -> Self {
        Self {
            target,
            duration_ms,
            trigger_reason: trigger_reason.into(),
        }
    }

    /// Create a command that never reverts
    pub fn permanent(target: ExpressionState, trigger_reason: impl Into<String>) -> Self {
        Self::new(target, 0, trigger_reason)
    }

    /// Delay before auto-revert, or `None` if the command is permanent
    #[must_use]
    pub fn revert_after(&self) -> Option<Duration> {
        u64::try_from(self.duration_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}
