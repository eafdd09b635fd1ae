//! `cpal` microphone confined to a dedicated OS thread.
//!
//! `cpal::Stream` is `!Send` on some platforms. Each opened stream lives on
//! its own thread for its whole lifetime; the returned [`CpalStream`] is the
//! `Send` handle that shuts the thread down and joins it on drop.

use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfig};

use crate::capture::{InputFormat, MicrophoneSource, MicrophoneStream, SampleCallback};
use crate::error::PresenceError;

/// Information about an available audio input device.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
}

/// Microphone backed by the default `cpal` host.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    /// Device name to open; `None` selects the system default.
    device_name: Option<String>,
}

impl CpalMicrophone {
    #[must_use]
    pub const fn new() -> Self {
        Self { device_name: None }
    }

    /// Open a specific input device by name instead of the default.
    #[must_use]
    pub const fn with_device(name: String) -> Self {
        Self {
            device_name: Some(name),
        }
    }

    /// List available audio input devices.
    pub fn list_devices() -> Result<Vec<AudioDeviceInfo>, PresenceError> {
        let host = cpal::default_host();
        let default_name = host
            .default_input_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();

        let devices = host
            .input_devices()
            .map_err(|e| PresenceError::DeviceUnavailable(e.to_string()))?;

        let mut result = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                result.push(AudioDeviceInfo {
                    is_default: name == default_name,
                    name,
                });
            }
        }

        Ok(result)
    }

    fn find_device(&self) -> Result<Device, PresenceError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_input_device().ok_or_else(|| {
                PresenceError::DeviceUnavailable("no default input device".to_string())
            }),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| PresenceError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| &n == wanted))
                .ok_or_else(|| PresenceError::DeviceUnavailable(format!("no input device named '{wanted}'"))),
        }
    }

    /// Body of the capture thread. Owns the `cpal::Stream` until shutdown.
    fn run(
        &self,
        on_samples: SampleCallback,
        init_tx: &mpsc::Sender<Result<InputFormat, PresenceError>>,
        shutdown_rx: &mpsc::Receiver<()>,
    ) {
        let opened = self.find_device().and_then(|device| {
            let config = device
                .default_input_config()
                .map_err(|e| PresenceError::DeviceUnavailable(e.to_string()))?;
            let format = InputFormat {
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
            };
            let stream = build_input_stream(&device, &config, format, on_samples)?;
            stream
                .play()
                .map_err(|e| PresenceError::InputStreamError(e.to_string()))?;

            tracing::info!(
                device = %device.name().unwrap_or_default(),
                sample_rate = format.sample_rate,
                channels = format.channels,
                "Microphone opened"
            );
            Ok((stream, format))
        });

        let stream = match opened {
            Ok((stream, format)) => {
                if init_tx.send(Ok(format)).is_err() {
                    return;
                }
                stream
            }
            Err(e) => {
                let _ = init_tx.send(Err(e));
                return;
            }
        };

        // Block until the handle is dropped.
        let _ = shutdown_rx.recv();
        drop(stream);
        tracing::debug!("Capture thread shutting down");
    }
}

impl MicrophoneSource for CpalMicrophone {
    fn open(&self, on_samples: SampleCallback) -> Result<Box<dyn MicrophoneStream>, PresenceError> {
        let (init_tx, init_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let microphone = self.clone();

        let thread = thread::Builder::new()
            .name("aura-capture".into())
            .spawn(move || microphone.run(on_samples, &init_tx, &shutdown_rx))
            .map_err(|e| {
                PresenceError::InputStreamError(format!("failed to spawn capture thread: {e}"))
            })?;

        let format = match init_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(PresenceError::AudioThreadDied);
            }
        };

        Ok(Box::new(CpalStream {
            format,
            shutdown_tx,
            thread: Some(thread),
        }))
    }
}

/// `Send` handle to an open capture thread.
pub struct CpalStream {
    format: InputFormat,
    shutdown_tx: mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MicrophoneStream for CpalStream {
    fn format(&self) -> InputFormat {
        self.format
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        // Best-effort shutdown, the thread may already be dead.
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Build a cpal input stream that converts every buffer to `f32` and hands
/// it to `on_samples`.
fn build_input_stream(
    device: &Device,
    config: &SupportedStreamConfig,
    format: InputFormat,
    mut on_samples: SampleCallback,
) -> Result<Stream, PresenceError> {
    let stream_config: StreamConfig = config.clone().into();
    let sample_format = config.sample_format();

    let err_fn = |err: cpal::StreamError| {
        tracing::error!(%err, "Audio input stream error");
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| on_samples(data, format),
            err_fn,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch = Vec::new();
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| f32::from(s) / 32768.0));
                    on_samples(&scratch, format);
                },
                err_fn,
                None,
            )
        }
        SampleFormat::I32 => {
            let mut scratch = Vec::new();
            device.build_input_stream(
                &stream_config,
                move |data: &[i32], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    #[allow(clippy::cast_precision_loss)]
                    scratch.extend(data.iter().map(|&s| s as f32 / 2_147_483_648.0));
                    on_samples(&scratch, format);
                },
                err_fn,
                None,
            )
        }
        _ => {
            return Err(PresenceError::InputStreamError(format!(
                "Unsupported sample format: {sample_format:?}"
            )));
        }
    };

    stream.map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            PresenceError::DeviceUnavailable(e.to_string())
        }
        other => PresenceError::InputStreamError(other.to_string()),
    })
}
