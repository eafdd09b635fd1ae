//! Presence engine error types.

#[cfg(feature = "whisper")]
use std::path::PathBuf;

use aura_core::SettingsError;

/// Errors that can occur while orchestrating presence.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// No usable microphone (absent, busy or permission denied).
    #[error("Microphone unavailable: {0}")]
    DeviceUnavailable(String),

    /// Failed to open or run the audio input stream.
    #[error("Failed to open audio input stream: {0}")]
    InputStreamError(String),

    /// Audio resampling error.
    #[error("Audio resampling failed: {0}")]
    ResampleError(String),

    /// The dedicated capture thread exited unexpectedly.
    #[error("Audio capture thread died")]
    AudioThreadDied,

    /// The platform offers no speech recognition.
    #[error("Speech recognition is not supported on this platform")]
    RecognitionUnsupported,

    /// The recognizer failed to start or run.
    #[error("Speech recognition failed: {0}")]
    RecognitionFailed(String),

    /// `start` was called on a session that is already open.
    #[error("{0} session is already open")]
    SessionAlreadyOpen(&'static str),

    /// The remote conversation rejected outbound input.
    #[error("Remote conversation error: {0}")]
    Transport(String),

    /// The presence runtime task is no longer running.
    #[error("Presence runtime has stopped")]
    RuntimeStopped,

    /// Invalid presence settings.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Model file not found at expected path.
    #[cfg(feature = "whisper")]
    #[error("Whisper model not found at {0}")]
    ModelNotFound(PathBuf),

    /// Failed to load whisper model.
    #[cfg(feature = "whisper")]
    #[error("Failed to load whisper model: {0}")]
    WhisperLoadError(String),
}
