//! Real-time duplex voice sessions with a remote conversational service.
//!
//! Microphone audio is captured, cut into fixed-size PCM16 frames and handed
//! to a [`VoiceTransport`]; synthesized speech coming back is decoded segment
//! by segment and scheduled gaplessly on the output clock, with immediate
//! barge-in when the remote side reports an interruption. An amplitude
//! monitor exposes the output level for visualizers, and [`OneShotPlayer`]
//! plays single narration clips through the same scheduler.
//!
//! The concrete network protocol is supplied by the caller through
//! [`VoiceTransport`]; [`LocalAudioBackend`] provides the default
//! cpal/rodio devices.
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tokio_test as _;

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod frame;
pub mod monitor;
pub mod oneshot;
pub mod scheduler;
pub mod segment;
pub mod session;
pub mod transport;
pub mod uplink;

// Re-export key types for convenience
pub use config::{LiveAudioConfig, SessionConfig};
pub use device::{
    AudioBackend, AudioDeviceInfo, AudioDevices, CaptureSource, LocalAudioBackend, OutputBus,
    OutputDevice, list_input_devices, list_output_devices,
};
pub use engine::EngineSnapshot;
pub use error::VoiceError;
pub use frame::{EncodedFrame, FrameEncoder};
pub use monitor::AmplitudeMonitor;
pub use oneshot::{Narration, NarrationEvent, OneShotPlayer};
pub use scheduler::{PlaybackScheduler, SchedulerState};
pub use segment::{EncodedSegment, PlaybackBuffer, SegmentDecoder, SegmentEncoding};
pub use session::{LiveSession, SessionState};
pub use transport::{ServerEvent, ServerEvents, VoiceTransport};
