//! Core domain types for the aura voice avatar.
//!
//! This crate has no audio or async dependencies: it holds the affect state
//! the presence engine maintains, the emotion classifier port with its
//! lexicon implementation, agent profiles and presence settings.
#![deny(unused_crate_dependencies)]

pub mod affect;
pub mod agents;
pub mod emotion;
pub mod sentiment;
pub mod settings;

pub use affect::{AffectState, ConnectionState, PresenceSnapshot, RecognitionStatus};
pub use agents::{
    AGENT_COLORS, AgentError, AgentProfile, AgentRoster, AgentUpdate, AgentVoice, UserProfile,
    preset_agents,
};
pub use emotion::{Emotion, ParseEmotionError};
pub use sentiment::{
    EmotionClassifier, HAPPY_THRESHOLD, LexiconClassifier, SAD_THRESHOLD, SentimentScore,
    emotion_from_comparative,
};
pub use settings::{
    DEFAULT_CHUNK_MS, DEFAULT_LISTENING_THRESHOLD, DEFAULT_RECOGNITION_LANGUAGE,
    DEFAULT_TALKING_COOLDOWN_MS, DEFAULT_TALKING_THRESHOLD, EditReconnectPolicy,
    PresenceSettings, SettingsError, validate_presence_settings,
};
