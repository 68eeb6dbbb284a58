//! Audio and session configuration.
//!
//! The sample rates and frame size are a fixed contract with the remote voice
//! service (16 kHz mono PCM up, 24 kHz mono PCM down). They are kept as
//! configuration so a different service can be targeted without code changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::VoiceError;

/// Capture rate expected by the remote service (16 kHz mono).
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Rate of synthesized audio pushed by the remote service (24 kHz mono).
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per uplink frame (256 ms at 16 kHz).
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Frames rendered by the output bus per processing quantum.
pub const DEFAULT_RENDER_QUANTUM: usize = 128;

/// Output samples inspected by the amplitude monitor per tick.
pub const DEFAULT_ANALYSER_WINDOW: usize = 256;

/// Tuning for capture, playback and monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LiveAudioConfig {
    /// Capture sample rate (mono).
    pub input_sample_rate: u32,

    /// Playback sample rate (mono). Also the resolution of the playback clock.
    pub output_sample_rate: u32,

    /// Samples per uplink frame. Must be a power of two.
    pub frame_size: usize,

    /// Frames mixed per output render pass. Interruptions take effect
    /// within one quantum.
    pub render_quantum: usize,

    /// Number of most recent output samples reduced to one volume value.
    pub analyser_window: usize,

    /// Amplitude monitor cadence in milliseconds (~60 Hz refresh by default).
    pub monitor_interval_ms: u64,

    /// One-shot narration progress cadence in milliseconds.
    pub progress_interval_ms: u64,

    /// Linear gain applied to the output mix before the analyser tap.
    pub output_gain: f32,
}

impl Default for LiveAudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            render_quantum: DEFAULT_RENDER_QUANTUM,
            analyser_window: DEFAULT_ANALYSER_WINDOW,
            monitor_interval_ms: 16,
            progress_interval_ms: 100,
            output_gain: 1.0,
        }
    }
}

impl LiveAudioConfig {
    /// Check that every value is usable by the pipeline.
    pub fn validate(&self) -> Result<(), VoiceError> {
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(VoiceError::InvalidConfig(
                "sample rates must be non-zero".to_string(),
            ));
        }
        if !self.frame_size.is_power_of_two() {
            return Err(VoiceError::InvalidConfig(format!(
                "frame size {} is not a power of two",
                self.frame_size
            )));
        }
        if self.render_quantum == 0 || self.analyser_window == 0 {
            return Err(VoiceError::InvalidConfig(
                "render quantum and analyser window must be non-zero".to_string(),
            ));
        }
        if self.monitor_interval_ms == 0 || self.progress_interval_ms == 0 {
            return Err(VoiceError::InvalidConfig(
                "monitor and progress intervals must be non-zero".to_string(),
            ));
        }
        if !self.output_gain.is_finite() || self.output_gain < 0.0 {
            return Err(VoiceError::InvalidConfig(format!(
                "output gain {} must be a finite, non-negative number",
                self.output_gain
            )));
        }
        Ok(())
    }

    /// Amplitude monitor tick interval.
    #[must_use]
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Narration progress tick interval.
    #[must_use]
    pub const fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// MIME type attached to uplink frames.
    #[must_use]
    pub fn input_mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.input_sample_rate)
    }
}

/// Parameters sent to the remote voice service when a session opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Remote model identifier.
    pub model: String,

    /// Prebuilt voice used for synthesized replies.
    pub voice: String,

    /// Persona instruction for the conversational model.
    pub system_instruction: String,

    /// MIME type of uplink audio frames.
    pub input_mime_type: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice: "Zephyr".to_string(),
            system_instruction: "You are a knowledgeable and calm literary companion. \
                Discuss books, analyze themes, and read excerpts with a soothing tone."
                .to_string(),
            input_mime_type: format!("audio/pcm;rate={INPUT_SAMPLE_RATE}"),
        }
    }
}

/// Convert a playback-clock position (output frames) to seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn frames_to_secs(frames: u64, sample_rate: u32) -> f64 {
    frames as f64 / f64::from(sample_rate)
}

/// Convert a playback-clock position (output frames) to a [`Duration`].
#[must_use]
pub fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(frames_to_secs(frames, sample_rate))
}
