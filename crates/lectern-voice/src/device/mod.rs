//! Device layer: capture and output abstractions for the live pipeline.
//!
//! These traits decouple the session, scheduler and monitor from any
//! specific audio backend:
//!
//! | Implementor | Where used |
//! |---|---|
//! | [`LocalAudioBackend`] | Desktop / CLI: cpal capture + rodio output on the local machine |
//! | test fakes | Integration tests: manual clock, no hardware |
//!
//! All traits are **object-safe** and take `&self`; implementations use
//! interior mutability (channels, atomics) for state changes.

mod bus;
mod capture;
mod local;
mod resample;
mod thread;

use std::sync::Arc;

use crate::config::LiveAudioConfig;
use crate::error::VoiceError;
use crate::scheduler::BufferHandle;

pub use bus::{BusSource, OutputBus};
pub use capture::{AudioDeviceInfo, list_input_devices, list_output_devices};
pub use local::LocalAudioBackend;

/// Receives captured mono samples at the configured input rate.
///
/// Runs on the device callback thread: it must not block.
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Fired once when a scheduled voice finishes playing naturally.
pub type EndCallback = Box<dyn FnOnce() + Send + 'static>;

/// A decoded buffer handed to the output device with an absolute start time.
pub struct ScheduledVoice {
    /// Cancellation handle shared with the scheduler's active set.
    pub handle: BufferHandle,

    /// Mono samples at the output rate.
    pub samples: Arc<[f32]>,

    /// Playback-clock frame at which rendering begins. A start in the past
    /// begins at the next render quantum.
    pub start_frame: u64,

    /// End-of-playback notification (not fired when stopped).
    pub on_end: Option<EndCallback>,
}

impl std::fmt::Debug for ScheduledVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledVoice")
            .field("id", &self.handle.id())
            .field("frames", &self.samples.len())
            .field("start_frame", &self.start_frame)
            .finish_non_exhaustive()
    }
}

// ── OutputDevice ───────────────────────────────────────────────────

/// Output rendering with mixing, a playback clock and an analyser tap.
pub trait OutputDevice: Send + Sync {
    /// Output sample rate; the playback clock ticks once per frame.
    fn sample_rate(&self) -> u32;

    /// Current playback-clock position in frames.
    fn now(&self) -> u64;

    /// Begin rendering `voice` at `voice.start_frame`, mixed with
    /// everything else already playing.
    fn start(&self, voice: ScheduledVoice) -> Result<(), VoiceError>;

    /// Copy the most recent post-gain output samples into `window`
    /// (oldest first). Returns how many samples were written.
    fn snapshot(&self, window: &mut [f32]) -> usize;

    /// Set the linear output gain.
    fn set_gain(&self, gain: f32);

    /// Stop all rendering and release the mix. Further `start` calls fail.
    fn close(&self);
}

// ── CaptureSource ──────────────────────────────────────────────────

/// Microphone capture delivering mono samples at the configured input rate.
pub trait CaptureSource: Send + Sync {
    /// Begin delivering samples to `on_samples`. Replaces any previous
    /// callback.
    fn start(&self, on_samples: SampleCallback) -> Result<(), VoiceError>;

    /// Stop delivering samples. Idempotent.
    fn stop(&self);

    /// Whether samples are currently being delivered.
    fn is_capturing(&self) -> bool;
}

// ── AudioBackend ───────────────────────────────────────────────────

/// The device contexts owned by one live session.
pub struct AudioDevices {
    /// Microphone at the input rate.
    pub capture: Box<dyn CaptureSource>,

    /// Output mix at the output rate.
    pub output: Arc<dyn OutputDevice>,
}

/// Acquires device contexts.
pub trait AudioBackend: Send + Sync {
    /// Open capture and output together. Microphone permission problems
    /// surface here as [`VoiceError::MicrophonePermissionDenied`].
    fn open(&self, config: &LiveAudioConfig) -> Result<AudioDevices, VoiceError>;

    /// Open only an output context (one-shot narration).
    fn open_output(&self, config: &LiveAudioConfig) -> Result<Arc<dyn OutputDevice>, VoiceError>;
}
