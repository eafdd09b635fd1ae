//! Affect state machine: the single owner of presence state.
//!
//! # States
//!
//! ```text
//!                 connect                     mute
//! Disconnected ───────────▶ ConnectedActive ◀──────▶ ConnectedMuted
//!      ▲                          │           unmute        │
//!      └──────── disconnect ──────┴─────────────────────────┘
//! ```
//!
//! The machine opens and closes the capture and transcription sessions on
//! these transitions and nowhere else. Session events reach it as
//! [`PresenceInput`]s through a channel and are applied one at a time by
//! [`handle_input`](AffectStateMachine::handle_input); events tagged with a
//! session that is no longer current are dropped.
//!
//! A recognition that keeps ending right after it starts is restarted at
//! most [`MAX_QUICK_RECOGNITION_RESTARTS`] times in a row; after that the
//! machine reports recognition as degraded until the sessions are reopened
//! by `connect` or `unmute`.
//!
//! `agent_talking` is not stored. It is "the talking cooldown has a deadline
//! in the future", so it can never disagree with the timer.

use std::sync::Arc;
use std::time::Duration;

use aura_core::{
    AffectState, ConnectionState, EditReconnectPolicy, Emotion, EmotionClassifier,
    PresenceSettings, PresenceSnapshot, RecognitionStatus, validate_presence_settings,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::capture::{AudioCaptureSession, CaptureEvent, MicrophoneSource};
use crate::clock::Clock;
use crate::cooldown::CooldownTimer;
use crate::error::PresenceError;
use crate::gate::VolumeGate;
use crate::remote::{RemoteConversation, RemoteEvent};
use crate::subscription::{SessionEvent, SessionId, Subscription};
use crate::transcription::{
    RecognitionEvent, RecognitionOptions, SpeechRecognizer, TranscriptionSession,
    TranscriptionStart,
};

/// A recognition that ends sooner than this after starting counts as a quick end.
pub const MIN_RECOGNITION_LIFETIME: Duration = Duration::from_secs(1);

/// Consecutive quick ends that are still answered with a restart.
pub const MAX_QUICK_RECOGNITION_RESTARTS: u32 = 3;

/// Everything the machine reacts to besides control signals.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceInput {
    Capture(SessionEvent<CaptureEvent>),
    Transcript(SessionEvent<RecognitionEvent>),
    Remote(RemoteEvent),
}

/// Collaborators the machine is wired to.
pub struct PresenceComponents {
    pub settings: PresenceSettings,
    pub microphone: Arc<dyn MicrophoneSource>,
    /// `None` when the platform has no speech recognition.
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
    pub remote: Arc<dyn RemoteConversation>,
    pub classifier: Arc<dyn EmotionClassifier>,
    pub clock: Arc<dyn Clock>,
}

pub struct AffectStateMachine {
    settings: PresenceSettings,
    listening_gate: VolumeGate,
    talking_gate: VolumeGate,
    capture: AudioCaptureSession,
    transcription: TranscriptionSession,
    remote: Arc<dyn RemoteConversation>,
    classifier: Arc<dyn EmotionClassifier>,
    clock: Arc<dyn Clock>,
    talking_cooldown: CooldownTimer,
    _subscriptions: Vec<Subscription>,

    connected: bool,
    muted: bool,
    agent_emotion: Emotion,
    user_listening: bool,
    user_emotion: Emotion,
    user_volume: f32,
    agent_volume: f32,
    capture_error: Option<String>,
    recognition: RecognitionStatus,
    recognition_started_at: Option<Instant>,
    quick_recognition_ends: u32,
    /// Set while an edit context is active; holds whether we were connected
    /// when it was entered.
    edit_context: Option<bool>,
}

impl AffectStateMachine {
    /// Build a disconnected machine whose sessions report into `inputs`.
    pub fn new(
        components: PresenceComponents,
        inputs: &mpsc::UnboundedSender<PresenceInput>,
    ) -> Result<Self, PresenceError> {
        let PresenceComponents {
            settings,
            microphone,
            recognizer,
            remote,
            classifier,
            clock,
        } = components;

        validate_presence_settings(&settings)?;
        let listening_gate = VolumeGate::new(settings.listening_threshold)?;
        let talking_gate = VolumeGate::new(settings.talking_threshold)?;

        let capture = AudioCaptureSession::new(microphone, settings.chunk_ms);
        let transcription = TranscriptionSession::new(
            recognizer,
            RecognitionOptions::continuous(settings.recognition_language.clone()),
        );

        let capture_tx = inputs.clone();
        let transcript_tx = inputs.clone();
        let subscriptions = vec![
            capture.subscribe(move |event| {
                let _ = capture_tx.send(PresenceInput::Capture(event.clone()));
            }),
            transcription.subscribe(move |event| {
                let _ = transcript_tx.send(PresenceInput::Transcript(event.clone()));
            }),
        ];

        Ok(Self {
            settings,
            listening_gate,
            talking_gate,
            capture,
            transcription,
            remote,
            classifier,
            clock,
            talking_cooldown: CooldownTimer::new(),
            _subscriptions: subscriptions,
            connected: false,
            muted: false,
            agent_emotion: Emotion::Neutral,
            user_listening: false,
            user_emotion: Emotion::Neutral,
            user_volume: 0.0,
            agent_volume: 0.0,
            capture_error: None,
            recognition: RecognitionStatus::Off,
            recognition_started_at: None,
            quick_recognition_ends: 0,
            edit_context: None,
        })
    }

    // ── Control signals ────────────────────────────────────────────

    /// Enter the connected state. No-op when already connected.
    ///
    /// If the microphone cannot be opened the machine falls back to
    /// `Disconnected`, records the failure for the snapshot and returns it.
    pub fn connect(&mut self) -> Result<(), PresenceError> {
        if self.connected {
            tracing::debug!("connect: already connected");
            return Ok(());
        }

        self.connected = true;
        self.capture_error = None;
        tracing::info!(muted = self.muted, "Presence connected");

        if self.muted {
            return Ok(());
        }
        self.open_sessions()
    }

    /// Enter `Disconnected`. No-op when already disconnected.
    pub fn disconnect(&mut self) {
        if !self.connected {
            tracing::debug!("disconnect: already disconnected");
            return;
        }

        self.connected = false;
        self.close_sessions();
        self.talking_cooldown.cancel();
        self.user_listening = false;
        self.user_emotion = Emotion::Neutral;
        self.user_volume = 0.0;
        self.agent_volume = 0.0;
        tracing::info!("Presence disconnected");
    }

    /// Mute the microphone. While connected this closes both local sessions.
    pub fn mute(&mut self) {
        if self.muted {
            return;
        }
        self.muted = true;

        if self.connected {
            self.close_sessions();
            self.user_listening = false;
            self.user_emotion = Emotion::Neutral;
            self.user_volume = 0.0;
        }
        tracing::info!(connected = self.connected, "Microphone muted");
    }

    /// Unmute the microphone. While connected this reopens both sessions.
    pub fn unmute(&mut self) -> Result<(), PresenceError> {
        if !self.muted {
            return Ok(());
        }
        self.muted = false;
        tracing::info!(connected = self.connected, "Microphone unmuted");

        if self.connected {
            self.open_sessions()
        } else {
            Ok(())
        }
    }

    /// An editing screen opened: drop the live conversation.
    pub fn enter_edit_context(&mut self) {
        if self.edit_context.is_some() {
            return;
        }
        self.edit_context = Some(self.connected);
        tracing::debug!(was_connected = self.connected, "Entered edit context");
        self.disconnect();
    }

    /// The editing screen closed. Reconnects only under
    /// [`EditReconnectPolicy::Restore`] and only if we were connected before.
    pub fn leave_edit_context(&mut self) -> Result<(), PresenceError> {
        let Some(was_connected) = self.edit_context.take() else {
            return Ok(());
        };
        tracing::debug!(was_connected, policy = ?self.settings.edit_reconnect, "Left edit context");

        match self.settings.edit_reconnect {
            EditReconnectPolicy::Restore if was_connected => self.connect(),
            _ => Ok(()),
        }
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Apply one event to the state.
    pub fn handle_input(&mut self, input: PresenceInput) {
        match input {
            PresenceInput::Capture(SessionEvent { session, event }) => {
                if self.capture.session_id() != Some(session) {
                    tracing::trace!(%session, "Discarding capture event from closed session");
                    return;
                }
                self.on_capture(event);
            }
            PresenceInput::Transcript(SessionEvent { session, event }) => {
                if self.transcription.session_id() != Some(session) {
                    tracing::trace!(%session, "Discarding transcript from closed session");
                    return;
                }
                self.on_transcript(session, event);
            }
            PresenceInput::Remote(event) => self.on_remote(event),
        }
    }

    fn on_capture(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Chunk(chunk) => {
                if let Err(e) = self.remote.send_realtime_input(&chunk) {
                    tracing::warn!(seq = chunk.seq, error = %e, "Failed to forward audio chunk");
                }
            }
            CaptureEvent::Volume(volume) => {
                self.user_volume = volume;
                self.user_listening = self.listening_gate.is_active(volume);
            }
        }
    }

    fn on_transcript(&mut self, session: SessionId, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Result { text, is_final } => {
                self.user_emotion = self.classifier.classify(&text);
                tracing::debug!(
                    %session,
                    is_final,
                    emotion = %self.user_emotion,
                    "Transcript classified"
                );
            }
            RecognitionEvent::Ended => {
                let now = self.clock.now();
                let lifetime = self
                    .recognition_started_at
                    .take()
                    .map(|started| now.saturating_duration_since(started));
                if lifetime.is_some_and(|lived| lived < MIN_RECOGNITION_LIFETIME) {
                    self.quick_recognition_ends += 1;
                } else {
                    self.quick_recognition_ends = 0;
                }
                tracing::debug!(
                    %session,
                    ?lifetime,
                    quick_ends = self.quick_recognition_ends,
                    "Speech recognition ended"
                );

                self.user_emotion = Emotion::Neutral;
                self.transcription.stop();
                self.recognition = RecognitionStatus::Off;

                if !(self.settings.restart_recognition_on_end && self.connected && !self.muted) {
                    return;
                }
                if self.quick_recognition_ends > MAX_QUICK_RECOGNITION_RESTARTS {
                    tracing::warn!(
                        quick_ends = self.quick_recognition_ends,
                        "Speech recognition keeps ending right after it starts; not restarting"
                    );
                    self.recognition = RecognitionStatus::Degraded;
                } else {
                    self.start_transcription();
                }
            }
        }
    }

    fn on_remote(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::Opened => {
                if let Err(e) = self.connect() {
                    tracing::error!(error = %e, "Failed to start presence on remote open");
                }
            }
            RemoteEvent::Closed { reason } => {
                tracing::info!(reason = reason.as_deref().unwrap_or("none"), "Remote conversation closed");
                self.disconnect();
            }
            _ if !self.connected => {
                tracing::trace!(?event, "Ignoring remote event while disconnected");
            }
            RemoteEvent::Content(turn) => {
                let text = turn.aggregated_text();
                if !text.is_empty() {
                    self.agent_emotion = self.classifier.classify(&text);
                    tracing::debug!(emotion = %self.agent_emotion, "Model turn classified");
                }
            }
            RemoteEvent::TurnComplete => {
                self.agent_emotion = Emotion::Neutral;
            }
            RemoteEvent::OutputVolume(volume) => {
                self.agent_volume = volume;
                if self.talking_gate.is_active(volume) {
                    let now = self.clock.now();
                    self.talking_cooldown
                        .arm(now, self.settings.talking_cooldown());
                }
            }
        }
    }

    /// Clear the talking cooldown if it has run out. Returns `true` when the
    /// agent just stopped talking.
    pub fn expire_cooldowns(&mut self) -> bool {
        let expired = self.talking_cooldown.take_expired(self.clock.now());
        if expired {
            tracing::trace!("Agent talking cooldown elapsed");
        }
        expired
    }

    /// Next instant at which state changes without any input.
    #[must_use]
    pub const fn next_deadline(&self) -> Option<Instant> {
        self.talking_cooldown.deadline()
    }

    // ── Reads ──────────────────────────────────────────────────────

    #[must_use]
    pub fn affect(&self) -> AffectState {
        AffectState {
            agent_talking: self.talking_cooldown.is_pending(self.clock.now()),
            agent_emotion: self.agent_emotion,
            user_listening: self.user_listening,
            user_emotion: self.user_emotion,
        }
    }

    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        match (self.connected, self.muted) {
            (false, _) => ConnectionState::Disconnected,
            (true, false) => ConnectionState::ConnectedActive,
            (true, true) => ConnectionState::ConnectedMuted,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot {
            affect: self.affect(),
            connection: self.connection_state(),
            muted: self.muted,
            user_volume: self.user_volume,
            agent_volume: self.agent_volume,
            capture_error: self.capture_error.clone(),
            recognition: self.recognition,
        }
    }

    #[must_use]
    pub fn capture_session(&self) -> Option<SessionId> {
        self.capture.session_id()
    }

    #[must_use]
    pub fn transcription_session(&self) -> Option<SessionId> {
        self.transcription.session_id()
    }

    #[must_use]
    pub const fn settings(&self) -> &PresenceSettings {
        &self.settings
    }

    // ── Session lifecycle ──────────────────────────────────────────

    fn open_sessions(&mut self) -> Result<(), PresenceError> {
        // Capture first: if the microphone fails, recognition never opens.
        if let Err(e) = self.capture.start() {
            tracing::error!(error = %e, "Microphone failed; disconnecting");
            self.disconnect();
            self.capture_error = Some(e.to_string());
            return Err(e);
        }
        self.quick_recognition_ends = 0;
        self.start_transcription();
        Ok(())
    }

    fn start_transcription(&mut self) {
        self.recognition = match self.transcription.start() {
            Ok(TranscriptionStart::Listening(_)) => {
                self.recognition_started_at = Some(self.clock.now());
                RecognitionStatus::Listening
            }
            Ok(TranscriptionStart::Degraded) => RecognitionStatus::Degraded,
            Err(e) => {
                tracing::warn!(error = %e, "Speech recognition unavailable; continuing without it");
                RecognitionStatus::Degraded
            }
        };
    }

    fn close_sessions(&mut self) {
        self.capture.stop();
        self.transcription.stop();
        self.recognition = RecognitionStatus::Off;
        self.recognition_started_at = None;
    }
}
