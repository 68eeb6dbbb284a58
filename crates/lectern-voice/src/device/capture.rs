//! Microphone capture via `cpal`.
//!
//! The input stream is opened at the 16 kHz contract rate when the device
//! supports it; otherwise the device default is used and audio is downmixed
//! and resampled inside the callback. The stream is built and started when
//! the capture is opened so that a denied microphone permission surfaces at
//! `connect` time; samples only flow to the registered callback while
//! capture is active.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfig};

use crate::device::SampleCallback;
use crate::device::resample::{StreamResampler, downmix_to_mono};
use crate::error::VoiceError;

/// Information about an available audio device.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Whether this is the system default device.
    pub is_default: bool,
}

/// Shared slot for the consumer callback.
type CallbackSlot = Arc<Mutex<Option<SampleCallback>>>;

/// An open microphone stream. Lives on the audio thread (`Stream` is `!Send`).
pub struct CpalCapture {
    _stream: Stream,
    callback: CallbackSlot,
    active: Arc<AtomicBool>,
}

impl CpalCapture {
    /// Open the default input device and start its stream (muted until
    /// [`start`](Self::start)).
    pub fn open(target_rate: u32) -> Result<Self, VoiceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(VoiceError::NoInputDevice)?;

        let config = pick_input_config(&device, target_rate)?;

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            target_rate,
            "Audio capture initialized"
        );

        let callback: CallbackSlot = Arc::new(Mutex::new(None));
        let active = Arc::new(AtomicBool::new(false));
        let stream = build_input_stream(
            &device,
            &config,
            target_rate,
            Arc::clone(&callback),
            Arc::clone(&active),
        )?;
        stream
            .play()
            .map_err(|e| classify_input_error(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            callback,
            active,
        })
    }

    /// Route captured samples to `on_samples`.
    pub fn start(&self, on_samples: SampleCallback) -> Result<(), VoiceError> {
        let mut slot = self
            .callback
            .lock()
            .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;
        *slot = Some(on_samples);
        self.active.store(true, Ordering::SeqCst);
        tracing::debug!("Audio capture started");
        Ok(())
    }

    /// Stop routing samples and drop the consumer callback.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.callback.lock() {
            slot.take();
        }
        tracing::debug!("Audio capture stopped");
    }

    /// Whether samples are being routed.
    pub fn is_capturing(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Prefer a configuration that natively runs at `target_rate` (mono first);
/// fall back to the device default.
fn pick_input_config(device: &Device, target_rate: u32) -> Result<SupportedStreamConfig, VoiceError> {
    let target = cpal::SampleRate(target_rate);

    if let Ok(ranges) = device.supported_input_configs() {
        let mut matching: Vec<_> = ranges
            .filter(|r| r.min_sample_rate() <= target && target <= r.max_sample_rate())
            .filter(|r| {
                matches!(
                    r.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::I32
                )
            })
            .collect();
        matching.sort_by_key(|r| (r.channels(), r.sample_format() != SampleFormat::F32));
        if let Some(range) = matching.into_iter().next() {
            return Ok(range.with_sample_rate(target));
        }
    }

    device
        .default_input_config()
        .map_err(|e| classify_input_error(e.to_string()))
}

/// Build a cpal input stream that converts to mono at `target_rate` and
/// forwards to the callback slot.
fn build_input_stream(
    device: &Device,
    config: &SupportedStreamConfig,
    target_rate: u32,
    callback: CallbackSlot,
    active: Arc<AtomicBool>,
) -> Result<Stream, VoiceError> {
    let stream_config: StreamConfig = config.clone().into();
    let sample_format = config.sample_format();
    let device_rate = config.sample_rate().0;
    let channels = config.channels();

    let mut resampler = if device_rate == target_rate {
        None
    } else {
        Some(StreamResampler::new(device_rate, target_rate)?)
    };
    let mut mono = Vec::new();
    let mut converted = Vec::new();

    // Runs on the device thread: never blocks on anything but the callback slot.
    let mut deliver = move |data: &[f32]| {
        if !active.load(Ordering::Relaxed) {
            return;
        }
        mono.clear();
        downmix_to_mono(data, channels, &mut mono);

        let samples: &[f32] = match resampler.as_mut() {
            Some(r) => {
                converted.clear();
                if let Err(e) = r.process(&mono, &mut converted) {
                    tracing::warn!(%e, "Dropping captured audio that failed to resample");
                    return;
                }
                &converted
            }
            None => &mono,
        };

        if samples.is_empty() {
            return;
        }
        if let Ok(mut slot) = callback.lock() {
            if let Some(cb) = slot.as_mut() {
                cb(samples);
            }
        }
    };

    let err_fn = |err: cpal::StreamError| {
        tracing::error!(%err, "Audio input stream error");
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| deliver(data),
            err_fn,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch = Vec::new();
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| f32::from(s) / 32_768.0));
                    deliver(&scratch);
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
                    deliver(&scratch);
                },
                err_fn,
                None,
            )
        }
        _ => {
            return Err(VoiceError::InputStreamError(format!(
                "Unsupported sample format: {sample_format:?}"
            )));
        }
    };

    stream.map_err(|e| classify_input_error(e.to_string()))
}

/// Map a backend error message to a permission failure when it looks like one.
///
/// Backends report a denied microphone as a generic backend-specific error,
/// so the message text is the only signal available.
pub(crate) fn classify_input_error(message: String) -> VoiceError {
    let lower = message.to_lowercase();
    let denied = ["permission", "denied", "not authorized", "not permitted", "eacces"]
        .iter()
        .any(|needle| lower.contains(needle));
    if denied {
        VoiceError::MicrophonePermissionDenied
    } else {
        VoiceError::InputStreamError(message)
    }
}

/// List available audio input devices.
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>, VoiceError> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    let devices = host
        .input_devices()
        .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;
    Ok(describe(devices, &default_name))
}

/// List available audio output devices.
pub fn list_output_devices() -> Result<Vec<AudioDeviceInfo>, VoiceError> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    let devices = host
        .output_devices()
        .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;
    Ok(describe(devices, &default_name))
}

fn describe(devices: impl Iterator<Item = Device>, default_name: &str) -> Vec<AudioDeviceInfo> {
    devices
        .filter_map(|device| device.name().ok())
        .map(|name| AudioDeviceInfo {
            is_default: name == default_name,
            name,
        })
        .collect()
}
