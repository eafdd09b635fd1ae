//! Emotion domain type.
//!
//! An [`Emotion`] is only ever produced by an
//! [`EmotionClassifier`](crate::sentiment::EmotionClassifier) from a text
//! fragment. Values are replaced, never mutated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Facial expression inferred for one side of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    /// No strong sentiment either way.
    #[default]
    Neutral,
    /// Positive sentiment.
    Happy,
    /// Negative sentiment.
    Sad,
}

impl Emotion {
    /// Lowercase label used on the wire and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
        }
    }

    /// Whether this is anything other than [`Emotion::Neutral`].
    #[must_use]
    pub const fn is_expressive(self) -> bool {
        !matches!(self, Self::Neutral)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown emotion label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown emotion '{0}' (expected neutral, happy or sad)")]
pub struct ParseEmotionError(String);

impl FromStr for Emotion {
    type Err = ParseEmotionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neutral" => Ok(Self::Neutral),
            "happy" => Ok(Self::Happy),
            "sad" => Ok(Self::Sad),
            _ => Err(ParseEmotionError(s.to_string())),
        }
    }
}
