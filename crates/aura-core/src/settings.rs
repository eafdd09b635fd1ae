//! Presence settings and validation.
//!
//! Every tunable of the presence engine lives here. Settings are pure data;
//! [`PresenceSettings::load`] reads them from a TOML file and missing keys
//! fall back to [`PresenceSettings::with_defaults`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Microphone volume above which the user counts as speaking.
pub const DEFAULT_LISTENING_THRESHOLD: f32 = 0.01;

/// Output volume above which the agent counts as speaking.
pub const DEFAULT_TALKING_THRESHOLD: f32 = 0.05;

/// How long `agent_talking` is held after the last loud output sample.
pub const DEFAULT_TALKING_COOLDOWN_MS: u64 = 2000;

/// Language tag handed to the speech recognizer.
pub const DEFAULT_RECOGNITION_LANGUAGE: &str = "en-US";

/// Duration of audio carried by one outbound chunk.
pub const DEFAULT_CHUNK_MS: u32 = 128;

/// What happens to the conversation when the user leaves an editing screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditReconnectPolicy {
    /// Stay disconnected; the user reconnects explicitly.
    #[default]
    Manual,
    /// Reconnect automatically if the conversation was live on entry.
    Restore,
}

/// Presence engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// Microphone volume threshold for `user_listening` (strictly greater).
    pub listening_threshold: f32,

    /// Output volume threshold that (re)arms the talking cooldown.
    pub talking_threshold: f32,

    /// Talking cooldown in milliseconds (1-60000).
    pub talking_cooldown_ms: u64,

    /// BCP-47 language tag for speech recognition.
    pub recognition_language: String,

    /// Start a new recognition session when the platform ends one on its own.
    pub restart_recognition_on_end: bool,

    /// Behaviour on leaving an edit context.
    pub edit_reconnect: EditReconnectPolicy,

    /// Outbound chunk length in milliseconds (10-1000).
    pub chunk_ms: u32,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PresenceSettings {
    /// Create settings with the stock tuning.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            listening_threshold: DEFAULT_LISTENING_THRESHOLD,
            talking_threshold: DEFAULT_TALKING_THRESHOLD,
            talking_cooldown_ms: DEFAULT_TALKING_COOLDOWN_MS,
            recognition_language: DEFAULT_RECOGNITION_LANGUAGE.to_string(),
            restart_recognition_on_end: true,
            edit_reconnect: EditReconnectPolicy::Manual,
            chunk_ms: DEFAULT_CHUNK_MS,
        }
    }

    /// The talking cooldown as a [`Duration`].
    #[must_use]
    pub const fn talking_cooldown(&self) -> Duration {
        Duration::from_millis(self.talking_cooldown_ms)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self =
            toml::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))?;
        validate_presence_settings(&settings)?;
        Ok(settings)
    }

    /// Load and validate settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let settings = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded presence settings");
        Ok(settings)
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("Volume threshold must be in [0, 1), got {0}")]
    InvalidThreshold(f32),

    #[error("Talking cooldown must be between 1 and 60000 ms, got {0}")]
    InvalidCooldown(u64),

    #[error("Recognition language cannot be empty")]
    EmptyLanguage,

    #[error("Chunk length must be between 10 and 1000 ms, got {0}")]
    InvalidChunkLength(u32),

    #[error("Failed to read settings from {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid settings file: {0}")]
    Parse(String),
}

/// Validate presence settings.
pub fn validate_presence_settings(settings: &PresenceSettings) -> Result<(), SettingsError> {
    for threshold in [settings.listening_threshold, settings.talking_threshold] {
        if !(0.0..1.0).contains(&threshold) {
            return Err(SettingsError::InvalidThreshold(threshold));
        }
    }

    if !(1..=60_000).contains(&settings.talking_cooldown_ms) {
        return Err(SettingsError::InvalidCooldown(settings.talking_cooldown_ms));
    }

    if settings.recognition_language.trim().is_empty() {
        return Err(SettingsError::EmptyLanguage);
    }

    if !(10..=1000).contains(&settings.chunk_ms) {
        return Err(SettingsError::InvalidChunkLength(settings.chunk_ms));
    }

    Ok(())
}
