//! Affect state: the single source of truth for avatar presentation.
//!
//! The presence engine owns and mutates these values; presentation code only
//! ever sees copies (snapshots) of them.

use serde::{Deserialize, Serialize};

use crate::emotion::Emotion;

/// Talking/listening flags plus each party's inferred emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectState {
    /// The model's spoken output is audible (held through the cooldown window).
    pub agent_talking: bool,
    /// Emotion of the model's current turn.
    pub agent_emotion: Emotion,
    /// The microphone is currently picking up the user.
    pub user_listening: bool,
    /// Emotion of the user's most recent utterance ("listening emotion").
    pub user_emotion: Emotion,
}

impl AffectState {
    /// Emotion the avatar should display right now.
    ///
    /// While the agent is talking its own emotion wins; otherwise the face
    /// mirrors what it hears from the user.
    #[must_use]
    pub const fn display_emotion(&self) -> Emotion {
        if self.agent_talking {
            self.agent_emotion
        } else {
            self.user_emotion
        }
    }

    /// Whether the avatar should animate (tilt) because someone is speaking.
    #[must_use]
    pub const fn is_animated(&self) -> bool {
        self.agent_talking || self.user_listening
    }
}

/// Connection state of the live conversation as seen by the presence engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No live conversation; local capture and recognition are closed.
    #[default]
    Disconnected,
    /// Connected with the microphone open.
    ConnectedActive,
    /// Connected with the microphone muted.
    ConnectedMuted,
}

impl ConnectionState {
    /// Whether a live conversation exists (muted or not).
    #[must_use]
    pub const fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

/// Availability of speech recognition for the listening emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionStatus {
    /// No recognition session is open.
    #[default]
    Off,
    /// A recognition session is open and delivering transcripts.
    Listening,
    /// The platform cannot recognise speech; listening emotion stays neutral.
    Degraded,
}

/// Read-only view handed to the presentation layer once per render tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    /// Derived talking/listening/emotion state.
    pub affect: AffectState,
    /// Current connection state.
    pub connection: ConnectionState,
    /// Whether the microphone is muted (independent of connection).
    pub muted: bool,
    /// Most recent microphone volume (0.0–1.0).
    pub user_volume: f32,
    /// Most recent model output volume (0.0–1.0).
    pub agent_volume: f32,
    /// User-visible message for the last capture failure, if any.
    pub capture_error: Option<String>,
    /// Speech recognition availability.
    pub recognition: RecognitionStatus,
}

impl PresenceSnapshot {
    /// Emotion the avatar should display (see [`AffectState::display_emotion`]).
    #[must_use]
    pub const fn display_emotion(&self) -> Emotion {
        self.affect.display_emotion()
    }
}
