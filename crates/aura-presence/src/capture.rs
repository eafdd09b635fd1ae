//! Audio capture session: microphone in, 16 kHz PCM chunks and volume out.
//!
//! [`AudioCaptureSession`] owns the microphone through a [`MicrophoneSource`]
//! port. While open it emits two interleaved event streams to its listeners:
//! outbound [`AudioChunk`]s (PCM16 little-endian at 16 kHz) and one RMS
//! volume sample per device callback.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rubato::{FftFixedIn, Resampler as _};
use serde::{Serialize, Serializer};

use crate::error::PresenceError;
use crate::subscription::{DeliveryGate, Listeners, SessionEvent, SessionId, Subscription};

/// Outbound sample rate expected by the remote conversation.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// MIME type attached to every outbound chunk.
pub const PCM_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Frames fed to the FFT resampler per pass.
const RESAMPLER_CHUNK: usize = 1024;

// ── Device port ────────────────────────────────────────────────────

/// Native format of an opened input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Receives interleaved `f32` samples from the device thread.
pub type SampleCallback = Box<dyn FnMut(&[f32], InputFormat) + Send + 'static>;

/// Something that can open a microphone.
pub trait MicrophoneSource: Send + Sync {
    /// Open the input device and start delivering samples to `on_samples`.
    ///
    /// Fails with [`PresenceError::DeviceUnavailable`] when no input device
    /// or permission exists.
    fn open(&self, on_samples: SampleCallback) -> Result<Box<dyn MicrophoneStream>, PresenceError>;
}

/// An open input stream. Dropping it releases the device; once `drop`
/// returns the sample callback is never invoked again.
pub trait MicrophoneStream: Send {
    fn format(&self) -> InputFormat;
}

// ── Events ─────────────────────────────────────────────────────────

/// One outbound chunk of 16 kHz mono PCM16 LE audio.
///
/// Serializes to the JSON transport shape, with `data` base64-encoded:
/// `{"seq":0,"mimeType":"audio/pcm;rate=16000","data":"AAEC","capturedAt":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunk {
    /// Position of this chunk within its capture session, from 0.
    pub seq: u64,
    /// Always [`PCM_MIME_TYPE`].
    pub mime_type: &'static str,
    /// Raw little-endian samples.
    #[serde(serialize_with = "serialize_base64")]
    pub data: Vec<u8>,
    /// When the last sample of the chunk reached the encoder.
    pub captured_at: DateTime<Utc>,
}

fn serialize_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(data))
}

impl AudioChunk {
    /// Number of 16-bit samples in the chunk.
    #[must_use]
    pub const fn sample_count(&self) -> usize {
        self.data.len() / 2
    }
}

/// Events emitted by an open capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Chunk(AudioChunk),
    /// RMS of one device callback, normalised to `0.0..=1.0`.
    Volume(f32),
}

// ── Encoding ───────────────────────────────────────────────────────

/// Streaming downmix + resample to 16 kHz mono.
pub struct MonoResampler {
    channels: usize,
    resampler: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl MonoResampler {
    pub fn new(format: InputFormat) -> Result<Self, PresenceError> {
        let resampler = if format.sample_rate == TARGET_SAMPLE_RATE {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(
                    format.sample_rate as usize,
                    TARGET_SAMPLE_RATE as usize,
                    RESAMPLER_CHUNK,
                    2, // sub-chunks for quality
                    1, // mono
                )
                .map_err(|e| PresenceError::ResampleError(e.to_string()))?,
            )
        };

        Ok(Self {
            channels: usize::from(format.channels.max(1)),
            resampler,
            pending: Vec::new(),
        })
    }

    /// Downmix `interleaved` and append it to the mono buffer. Returns the
    /// mono samples of this call (at the device rate) for volume metering.
    pub fn push(&mut self, interleaved: &[f32], out: &mut Vec<f32>) -> Result<Vec<f32>, PresenceError> {
        let mono = downmix(interleaved, self.channels);

        let Some(resampler) = self.resampler.as_mut() else {
            out.extend_from_slice(&mono);
            return Ok(mono);
        };

        self.pending.extend_from_slice(&mono);
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let result = resampler
                .process(&[&self.pending[..needed]], None)
                .map_err(|e| PresenceError::ResampleError(e.to_string()))?;
            if let Some(channel) = result.first() {
                out.extend_from_slice(channel);
            }
            self.pending.drain(..needed);
        }

        Ok(mono)
    }
}

/// Turns device callbacks into chunk and volume events.
pub struct CaptureEncoder {
    format: InputFormat,
    resampler: MonoResampler,
    buffered: Vec<f32>,
    chunk_samples: usize,
    next_seq: u64,
}

impl CaptureEncoder {
    pub fn new(format: InputFormat, chunk_ms: u32) -> Result<Self, PresenceError> {
        let chunk_samples = (TARGET_SAMPLE_RATE as usize * chunk_ms as usize / 1000).max(1);
        Ok(Self {
            format,
            resampler: MonoResampler::new(format)?,
            buffered: Vec::with_capacity(chunk_samples * 2),
            chunk_samples,
            next_seq: 0,
        })
    }

    #[must_use]
    pub const fn format(&self) -> InputFormat {
        self.format
    }

    /// Encode one device callback. The volume event comes first, followed by
    /// any chunks that filled up.
    pub fn encode(&mut self, interleaved: &[f32]) -> Result<Vec<CaptureEvent>, PresenceError> {
        let mono = self.resampler.push(interleaved, &mut self.buffered)?;
        let mut events = vec![CaptureEvent::Volume(rms(&mono))];

        while self.buffered.len() >= self.chunk_samples {
            let data = pcm16_le(&self.buffered[..self.chunk_samples]);
            self.buffered.drain(..self.chunk_samples);
            events.push(CaptureEvent::Chunk(AudioChunk {
                seq: self.next_seq,
                mime_type: PCM_MIME_TYPE,
                data,
                captured_at: Utc::now(),
            }));
            self.next_seq += 1;
        }

        Ok(events)
    }
}

/// Average interleaved channels into one.
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Root-mean-square level, clamped to `0.0..=1.0`.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / samples.len() as f32;
    mean.sqrt().clamp(0.0, 1.0)
}

fn pcm16_le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

// ── Session ────────────────────────────────────────────────────────

struct ActiveCapture {
    id: SessionId,
    stream: Box<dyn MicrophoneStream>,
}

/// Owner of the microphone.
///
/// At most one capture is open at a time. [`stop`](Self::stop) is
/// synchronous: once it returns the device is released and no listener sees
/// another event from the closed capture, even one already in flight on the
/// device thread.
pub struct AudioCaptureSession {
    source: Arc<dyn MicrophoneSource>,
    chunk_ms: u32,
    listeners: Listeners<SessionEvent<CaptureEvent>>,
    gate: DeliveryGate,
    active: Option<ActiveCapture>,
}

impl AudioCaptureSession {
    pub fn new(source: Arc<dyn MicrophoneSource>, chunk_ms: u32) -> Self {
        Self {
            source,
            chunk_ms,
            listeners: Listeners::new(),
            gate: DeliveryGate::default(),
            active: None,
        }
    }

    /// Register a listener for events from every capture this session opens.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SessionEvent<CaptureEvent>) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Open the microphone.
    ///
    /// Calling `start` on an open session is a caller bug and fails with
    /// [`PresenceError::SessionAlreadyOpen`]. On any other failure the
    /// session stays closed.
    pub fn start(&mut self) -> Result<SessionId, PresenceError> {
        if self.active.is_some() {
            return Err(PresenceError::SessionAlreadyOpen("capture"));
        }

        let id = SessionId::next();
        self.gate.open(id);

        let gate = self.gate.clone();
        let listeners = self.listeners.clone();
        let chunk_ms = self.chunk_ms;
        let mut encoder: Option<CaptureEncoder> = None;

        let on_samples: SampleCallback = Box::new(move |samples, format| {
            if encoder.as_ref().is_none_or(|e| e.format() != format) {
                match CaptureEncoder::new(format, chunk_ms) {
                    Ok(e) => encoder = Some(e),
                    Err(e) => {
                        tracing::error!(session = %id, error = %e, "Cannot encode capture format");
                        return;
                    }
                }
            }
            let Some(enc) = encoder.as_mut() else {
                return;
            };
            let events = match enc.encode(samples) {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(session = %id, error = %e, "Dropping capture buffer");
                    return;
                }
            };
            gate.deliver(id, || {
                for event in events {
                    listeners.emit(&SessionEvent { session: id, event });
                }
            });
        });

        match self.source.open(on_samples) {
            Ok(stream) => {
                let format = stream.format();
                tracing::info!(
                    session = %id,
                    sample_rate = format.sample_rate,
                    channels = format.channels,
                    "Audio capture started"
                );
                self.active = Some(ActiveCapture { id, stream });
                Ok(id)
            }
            Err(e) => {
                self.gate.close();
                tracing::warn!(error = %e, "Audio capture failed to start");
                Err(e)
            }
        }
    }

    /// Release the microphone. No-op when closed.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        self.gate.close();
        drop(active.stream);
        tracing::debug!(session = %active.id, "Audio capture stopped");
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Id of the open capture, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.id)
    }
}

impl Drop for AudioCaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
