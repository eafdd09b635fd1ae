//! Transcription session: continuous speech recognition for the
//! listening emotion.
//!
//! The platform recognizer sits behind the [`SpeechRecognizer`] port and is
//! optional: a session built without one starts in degraded mode and simply
//! never emits anything.

use std::sync::Arc;

use crate::error::PresenceError;
use crate::subscription::{DeliveryGate, Listeners, SessionEvent, SessionId, Subscription};

/// Recognizer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// BCP-47 language tag, e.g. `en-US`.
    pub language: String,
    /// Deliver interim (unstable) hypotheses as well as final ones.
    pub interim_results: bool,
    /// Keep listening across utterances instead of stopping after one.
    pub continuous: bool,
}

impl RecognitionOptions {
    /// Continuous recognition with interim results.
    pub fn continuous(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            interim_results: true,
            continuous: true,
        }
    }
}

/// Events produced by an open recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Best guess for the most recent utterance.
    Result { text: String, is_final: bool },
    /// The recognizer stopped on its own. No further events follow.
    Ended,
}

/// Sink a recognizer reports into. May be called from any thread.
pub type RecognitionSink = Box<dyn Fn(RecognitionEvent) + Send + Sync + 'static>;

/// Platform speech recognition.
pub trait SpeechRecognizer: Send + Sync {
    /// Begin recognising. Return [`PresenceError::RecognitionUnsupported`]
    /// if the platform turns out to lack the capability.
    fn start(
        &self,
        options: &RecognitionOptions,
        sink: RecognitionSink,
    ) -> Result<Box<dyn RecognitionHandle>, PresenceError>;
}

/// A running recognition. Dropping it stops recognition; once `drop`
/// returns the sink is never called again.
pub trait RecognitionHandle: Send {}

/// Outcome of [`TranscriptionSession::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionStart {
    Listening(SessionId),
    /// No recognition capability; nothing will be emitted.
    Degraded,
}

struct ActiveRecognition {
    id: SessionId,
    _handle: Box<dyn RecognitionHandle>,
}

/// Owner of the speech recognition resource.
pub struct TranscriptionSession {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    options: RecognitionOptions,
    listeners: Listeners<SessionEvent<RecognitionEvent>>,
    gate: DeliveryGate,
    active: Option<ActiveRecognition>,
}

impl TranscriptionSession {
    pub fn new(recognizer: Option<Arc<dyn SpeechRecognizer>>, options: RecognitionOptions) -> Self {
        Self {
            recognizer,
            options,
            listeners: Listeners::new(),
            gate: DeliveryGate::default(),
            active: None,
        }
    }

    /// Whether a recognizer is configured at all.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&SessionEvent<RecognitionEvent>) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Begin listening.
    ///
    /// Without recognition capability this succeeds with
    /// [`TranscriptionStart::Degraded`]. A session that ended on its own must
    /// be stopped before it can be started again.
    pub fn start(&mut self) -> Result<TranscriptionStart, PresenceError> {
        if self.active.is_some() {
            return Err(PresenceError::SessionAlreadyOpen("transcription"));
        }

        let Some(recognizer) = self.recognizer.as_ref() else {
            tracing::debug!("No speech recognizer available; listening emotion disabled");
            return Ok(TranscriptionStart::Degraded);
        };

        let id = SessionId::next();
        self.gate.open(id);

        let gate = self.gate.clone();
        let listeners = self.listeners.clone();
        let sink: RecognitionSink = Box::new(move |event| {
            let ended = matches!(event, RecognitionEvent::Ended);
            let delivered = gate.deliver(id, || {
                listeners.emit(&SessionEvent { session: id, event });
            });
            if delivered && ended {
                gate.close_if(id);
            }
        });

        match recognizer.start(&self.options, sink) {
            Ok(handle) => {
                tracing::info!(session = %id, language = %self.options.language, "Speech recognition started");
                self.active = Some(ActiveRecognition {
                    id,
                    _handle: handle,
                });
                Ok(TranscriptionStart::Listening(id))
            }
            Err(PresenceError::RecognitionUnsupported) => {
                self.gate.close();
                tracing::info!("Speech recognition unsupported; listening emotion disabled");
                Ok(TranscriptionStart::Degraded)
            }
            Err(e) => {
                self.gate.close();
                Err(e)
            }
        }
    }

    /// Stop recognising and release the recognizer. No-op when closed.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        self.gate.close();
        let id = active.id;
        drop(active);
        tracing::debug!(session = %id, "Speech recognition stopped");
    }

    /// Whether a recognition is open and has not ended on its own.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| self.gate.is_open_for(a.id))
    }

    /// Id of the current recognition, including one that has ended but not
    /// yet been stopped.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.id)
    }
}

impl Drop for TranscriptionSession {
    fn drop(&mut self) {
        self.stop();
    }
}
