//! Fake devices shared by the presence integration tests.
//!
//! No audio hardware or recognizer is touched: the fakes keep the callbacks
//! they were handed so a test can push samples and transcripts by hand, and
//! count how many device resources are live at any moment.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use aura_core::{LexiconClassifier, PresenceSettings};
use aura_presence::{
    AudioChunk, Clock, InputFormat, MicrophoneSource, MicrophoneStream, PresenceComponents,
    PresenceError, RecognitionEvent, RecognitionHandle, RecognitionOptions, RecognitionSink,
    RemoteConversation, SampleCallback, SpeechRecognizer, TARGET_SAMPLE_RATE,
};

pub const MONO_16K: InputFormat = InputFormat {
    sample_rate: TARGET_SAMPLE_RATE,
    channels: 1,
};

// ── Microphone ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeMicrophone {
    callback: Mutex<Option<SampleCallback>>,
    fail: AtomicBool,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
}

struct FakeStream {
    live: Arc<AtomicUsize>,
}

impl MicrophoneStream for FakeStream {
    fn format(&self) -> InputFormat {
        MONO_16K
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MicrophoneSource for FakeMicrophone {
    fn open(&self, on_samples: SampleCallback) -> Result<Box<dyn MicrophoneStream>, PresenceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PresenceError::DeviceUnavailable("permission denied".to_string()));
        }
        *self.callback.lock().unwrap() = Some(on_samples);
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            live: Arc::clone(&self.live),
        }))
    }
}

impl FakeMicrophone {
    /// Deliver samples through the most recently opened callback, as the
    /// device thread would (even after the stream was closed).
    pub fn emit(&self, samples: &[f32]) {
        if let Some(callback) = self.callback.lock().unwrap().as_mut() {
            callback(samples, MONO_16K);
        }
    }

    pub fn fail_next_open(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

// ── Recognizer ─────────────────────────────────────────────────────

pub enum RecognizerMode {
    Working,
    Unsupported,
    Broken,
    /// Starts, then reports `Ended` before `start` returns.
    EndsImmediately,
}

pub struct FakeRecognizer {
    mode: Mutex<RecognizerMode>,
    sink: Mutex<Option<RecognitionSink>>,
    starts: AtomicUsize,
    live: Arc<AtomicUsize>,
    language: Mutex<Option<String>>,
}

struct FakeRecognition {
    live: Arc<AtomicUsize>,
}

impl RecognitionHandle for FakeRecognition {}

impl Drop for FakeRecognition {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for FakeRecognizer {
    fn default() -> Self {
        Self::new(RecognizerMode::Working)
    }
}

impl SpeechRecognizer for FakeRecognizer {
    fn start(
        &self,
        options: &RecognitionOptions,
        sink: RecognitionSink,
    ) -> Result<Box<dyn RecognitionHandle>, PresenceError> {
        let ends_immediately = match *self.mode.lock().unwrap() {
            RecognizerMode::Unsupported => return Err(PresenceError::RecognitionUnsupported),
            RecognizerMode::Broken => {
                return Err(PresenceError::RecognitionFailed("audio-capture".to_string()));
            }
            RecognizerMode::Working => false,
            RecognizerMode::EndsImmediately => true,
        };
        *self.language.lock().unwrap() = Some(options.language.clone());
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        if ends_immediately {
            sink(RecognitionEvent::Ended);
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(Box::new(FakeRecognition {
            live: Arc::clone(&self.live),
        }))
    }
}

impl FakeRecognizer {
    pub fn new(mode: RecognizerMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            sink: Mutex::new(None),
            starts: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            language: Mutex::new(None),
        }
    }

    pub fn say(&self, text: &str) {
        self.send(RecognitionEvent::Result {
            text: text.to_string(),
            is_final: true,
        });
    }

    pub fn end(&self) {
        self.send(RecognitionEvent::Ended);
    }

    fn send(&self, event: RecognitionEvent) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink(event);
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn language(&self) -> Option<String> {
        self.language.lock().unwrap().clone()
    }
}

// ── Remote ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingRemote {
    chunks: Mutex<Vec<AudioChunk>>,
}

impl RemoteConversation for RecordingRemote {
    fn send_realtime_input(&self, chunk: &AudioChunk) -> Result<(), PresenceError> {
        self.chunks.lock().unwrap().push(chunk.clone());
        Ok(())
    }
}

impl RecordingRemote {
    pub fn chunks(&self) -> Vec<AudioChunk> {
        self.chunks.lock().unwrap().clone()
    }
}

// ── Wiring ─────────────────────────────────────────────────────────

pub struct Fakes {
    pub microphone: Arc<FakeMicrophone>,
    pub recognizer: Arc<FakeRecognizer>,
    pub remote: Arc<RecordingRemote>,
}

impl Fakes {
    pub fn new(mode: RecognizerMode) -> Self {
        Self {
            microphone: Arc::new(FakeMicrophone::default()),
            recognizer: Arc::new(FakeRecognizer::new(mode)),
            remote: Arc::new(RecordingRemote::default()),
        }
    }

    pub fn components(&self, settings: PresenceSettings, clock: Arc<dyn Clock>) -> PresenceComponents {
        PresenceComponents {
            settings,
            microphone: Arc::clone(&self.microphone) as Arc<dyn MicrophoneSource>,
            recognizer: Some(Arc::clone(&self.recognizer) as Arc<dyn SpeechRecognizer>),
            remote: Arc::clone(&self.remote) as Arc<dyn RemoteConversation>,
            classifier: Arc::new(LexiconClassifier::new()),
            clock,
        }
    }
}
