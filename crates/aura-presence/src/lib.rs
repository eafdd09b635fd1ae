//! Presence orchestration for the aura voice avatar.
//!
//! Fuses microphone volume and audio, speech transcripts and remote model
//! events into one [`AffectState`](aura_core::AffectState), and owns the
//! lifecycle of the local capture and recognition sessions.
#![deny(unused_crate_dependencies)]

pub mod audio_thread;
pub mod backend;
pub mod capture;
pub mod clock;
pub mod cooldown;
pub mod error;
pub mod gate;
pub mod machine;
pub mod remote;
pub mod runtime;
pub mod subscription;
pub mod transcription;

// Re-export key types for convenience
pub use audio_thread::{AudioDeviceInfo, CpalMicrophone};
pub use capture::{
    AudioCaptureSession, AudioChunk, CaptureEvent, InputFormat, MicrophoneSource,
    MicrophoneStream, PCM_MIME_TYPE, SampleCallback, TARGET_SAMPLE_RATE,
};
pub use clock::{Clock, ManualClock, TokioClock};
pub use cooldown::CooldownTimer;
pub use error::PresenceError;
pub use gate::VolumeGate;
pub use machine::{
    AffectStateMachine, MAX_QUICK_RECOGNITION_RESTARTS, MIN_RECOGNITION_LIFETIME,
    PresenceComponents, PresenceInput,
};
pub use remote::{ChannelConversation, ModelTurn, RemoteConversation, RemoteEvent, TurnPart};
pub use runtime::{PresenceHandle, PresenceRuntime};
pub use subscription::{Listeners, SessionEvent, SessionId, Subscription};
pub use transcription::{
    RecognitionEvent, RecognitionHandle, RecognitionOptions, RecognitionSink, SpeechRecognizer,
    TranscriptionSession, TranscriptionStart,
};

// Only exercised by the integration tests
#[cfg(test)]
use tokio_test as _;
