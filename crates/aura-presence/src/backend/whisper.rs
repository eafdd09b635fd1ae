//! Local speech recognizer on whisper.cpp via `whisper-rs`.
//!
//! Opens its own microphone stream, keeps a rolling 16 kHz buffer of the
//! current utterance and re-transcribes it once per second of new audio
//! (interim results). After [`FINAL_SILENCE`] of quiet the utterance is
//! transcribed one last time as a final result and the buffer is reset.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::capture::{InputFormat, MicrophoneSource, MicrophoneStream, MonoResampler, TARGET_SAMPLE_RATE, rms};
use crate::error::PresenceError;
use crate::transcription::{
    RecognitionEvent, RecognitionHandle, RecognitionOptions, RecognitionSink, SpeechRecognizer,
};

/// New audio needed before an interim transcription.
const INTERIM_STEP: Duration = Duration::from_secs(1);

/// Trailing quiet that closes an utterance.
const FINAL_SILENCE: Duration = Duration::from_millis(700);

/// Level below which a buffer counts as quiet.
const SILENCE_LEVEL: f32 = 0.01;

/// Longest utterance kept before forcing a final result.
const MAX_UTTERANCE: Duration = Duration::from_secs(30);

const fn samples_for(duration: Duration) -> usize {
    (TARGET_SAMPLE_RATE as u128 * duration.as_millis() / 1000) as usize
}

/// Whisper-backed [`SpeechRecognizer`].
pub struct WhisperRecognizer {
    /// The loaded whisper context (thread-safe, shareable).
    context: Arc<WhisperContext>,
    microphone: Arc<dyn MicrophoneSource>,
}

impl WhisperRecognizer {
    /// Load a whisper GGML model from disk.
    pub fn load(model_path: &Path, microphone: Arc<dyn MicrophoneSource>) -> Result<Self, PresenceError> {
        if !model_path.exists() {
            return Err(PresenceError::ModelNotFound(model_path.to_path_buf()));
        }

        let model_path_str = model_path
            .to_str()
            .ok_or_else(|| PresenceError::WhisperLoadError("Invalid model path".to_string()))?;

        tracing::info!(path = %model_path.display(), "Loading whisper model");

        let context = WhisperContext::new_with_params(model_path_str, WhisperContextParameters::default())
            .map_err(|e| PresenceError::WhisperLoadError(format!("{e}")))?;

        tracing::info!("Whisper model loaded successfully");

        Ok(Self {
            context: Arc::new(context),
            microphone,
        })
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn start(
        &self,
        options: &RecognitionOptions,
        sink: RecognitionSink,
    ) -> Result<Box<dyn RecognitionHandle>, PresenceError> {
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<f32>>();
        let mut resampler: Option<(InputFormat, MonoResampler)> = None;

        let stream = self.microphone.open(Box::new(move |samples, format| {
            if resampler.as_ref().is_none_or(|(f, _)| *f != format) {
                match MonoResampler::new(format) {
                    Ok(r) => resampler = Some((format, r)),
                    Err(e) => {
                        tracing::error!(error = %e, "Cannot resample recognition audio");
                        return;
                    }
                }
            }
            let Some((_, resampler)) = resampler.as_mut() else {
                return;
            };
            let mut out = Vec::new();
            if resampler.push(samples, &mut out).is_ok() && !out.is_empty() {
                let _ = audio_tx.send(out);
            }
        }))?;

        // whisper wants a bare language code ("en"), not a locale ("en-US").
        let language = options
            .language
            .split(['-', '_'])
            .next()
            .unwrap_or("en")
            .to_ascii_lowercase();
        let stop = StopFlag::default();
        let worker = Worker {
            context: Arc::clone(&self.context),
            language,
            interim: options.interim_results,
            sink,
            stop: stop.clone(),
        };

        let thread = thread::Builder::new()
            .name("aura-whisper".into())
            .spawn(move || worker.run(&audio_rx))
            .map_err(|e| PresenceError::RecognitionFailed(format!("failed to spawn whisper thread: {e}")))?;

        Ok(Box::new(WhisperHandle {
            stop,
            stream: Some(stream),
            thread: Some(thread),
        }))
    }
}

/// Shared between a [`WhisperHandle`] and its worker. Also aborts a
/// transcription that is still running when the handle is dropped.
#[derive(Clone, Default)]
struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Callback for whisper's abort hook: `true` once a stop was requested.
    fn abort_callback(&self) -> impl FnMut() -> bool + 'static {
        let flag = Arc::clone(&self.0);
        move || flag.load(Ordering::SeqCst)
    }
}

struct WhisperHandle {
    stop: StopFlag,
    stream: Option<Box<dyn MicrophoneStream>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RecognitionHandle for WhisperHandle {}

impl Drop for WhisperHandle {
    fn drop(&mut self) {
        self.stop.request();
        // Closing the stream drops the audio sender and wakes the worker.
        self.stream = None;
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    context: Arc<WhisperContext>,
    language: String,
    interim: bool,
    sink: RecognitionSink,
    stop: StopFlag,
}

impl Worker {
    fn run(self, audio_rx: &mpsc::Receiver<Vec<f32>>) {
        let mut utterance: Vec<f32> = Vec::new();
        let mut since_interim = 0usize;
        let mut quiet = 0usize;
        let mut heard_speech = false;

        loop {
            if self.stop.is_requested() {
                return;
            }

            let buffer = match audio_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(buffer) => buffer,
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    if !self.stop.is_requested() {
                        tracing::warn!("Recognition audio stream ended");
                        (self.sink)(RecognitionEvent::Ended);
                    }
                    return;
                }
            };

            if rms(&buffer) > SILENCE_LEVEL {
                heard_speech = true;
                quiet = 0;
            } else {
                quiet += buffer.len();
            }

            if !heard_speech {
                continue;
            }
            since_interim += buffer.len();
            utterance.extend_from_slice(&buffer);

            let finished = quiet >= samples_for(FINAL_SILENCE)
                || utterance.len() >= samples_for(MAX_UTTERANCE);
            if finished {
                self.emit(&utterance, true);
                utterance.clear();
                since_interim = 0;
                quiet = 0;
                heard_speech = false;
            } else if self.interim && since_interim >= samples_for(INTERIM_STEP) {
                self.emit(&utterance, false);
                since_interim = 0;
            }
        }
    }

    fn emit(&self, audio: &[f32], is_final: bool) {
        match self.transcribe(audio) {
            Ok(text) if !text.is_empty() => (self.sink)(RecognitionEvent::Result { text, is_final }),
            Ok(_) => {}
            Err(_) if self.stop.is_requested() => {}
            Err(e) => tracing::warn!(error = %e, "Whisper transcription failed"),
        }
    }

    fn transcribe(&self, audio: &[f32]) -> Result<String, PresenceError> {
        let mut state = self
            .context
            .create_state()
            .map_err(|e| PresenceError::RecognitionFailed(format!("Failed to create state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(self.language.as_str()));
        params.set_single_segment(true);
        params.set_no_timestamps(true);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_special(false);
        params.set_suppress_nst(true);
        params.set_abort_callback_safe(self.stop.abort_callback());

        state
            .full(params, audio)
            .map_err(|e| PresenceError::RecognitionFailed(format!("{e}")))?;

        let mut text = String::new();
        for i in 0..state.full_n_segments() {
            if let Some(segment) = state.get_segment(i) {
                if let Ok(segment_text) = segment.to_str() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(segment_text.trim());
                }
            }
        }

        Ok(text.trim().to_string())
    }
}
