//! Boundary to the remote conversational model.
//!
//! The transport itself (handshake, framing, authentication) lives outside
//! this crate. The presence engine only pushes microphone chunks into a
//! [`RemoteConversation`] and consumes [`RemoteEvent`]s from it.

use tokio::sync::mpsc;

use crate::capture::AudioChunk;
use crate::error::PresenceError;

/// Inline media carried by a model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineData {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// One part of a partial model turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnPart {
    pub text: Option<String>,
    pub inline_audio: Option<InlineData>,
}

impl TurnPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_audio: None,
        }
    }

    pub fn audio(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            text: None,
            inline_audio: Some(InlineData {
                mime_type: mime_type.into(),
                data,
            }),
        }
    }
}

/// A partial model turn as delivered by a `content` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelTurn {
    pub parts: Vec<TurnPart>,
}

impl ModelTurn {
    /// Text parts joined with single spaces and trimmed.
    #[must_use]
    pub fn aggregated_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

/// Events the remote conversation reports to the presence engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// The live conversation is up.
    Opened,
    /// The live conversation went away (closed by either side or failed).
    Closed { reason: Option<String> },
    /// Partial model turn.
    Content(ModelTurn),
    /// The model finished its turn.
    TurnComplete,
    /// Current model output volume, normalised to `0.0..=1.0`.
    OutputVolume(f32),
}

/// Outbound half of the remote conversation.
pub trait RemoteConversation: Send + Sync {
    /// Queue a microphone chunk for the model. Must not block.
    fn send_realtime_input(&self, chunk: &AudioChunk) -> Result<(), PresenceError>;
}

/// [`RemoteConversation`] that forwards chunks into a channel, for a
/// transport running on its own task.
#[derive(Debug, Clone)]
pub struct ChannelConversation {
    tx: mpsc::UnboundedSender<AudioChunk>,
}

impl ChannelConversation {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AudioChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RemoteConversation for ChannelConversation {
    fn send_realtime_input(&self, chunk: &AudioChunk) -> Result<(), PresenceError> {
        self.tx
            .send(chunk.clone())
            .map_err(|_| PresenceError::Transport("outbound channel closed".to_string()))
    }
}
