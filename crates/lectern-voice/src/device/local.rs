//! Local (cpal/rodio) implementation of the device traits.
//!
//! [`LocalCapture`] and [`LocalOutput`] share one `Arc<AudioThreadHandle>`:
//! the audio thread owns both the microphone stream and the output stream,
//! and it shuts down when the last adapter is dropped.

use std::sync::Arc;

use crate::config::LiveAudioConfig;
use crate::device::bus::OutputBus;
use crate::device::thread::AudioThreadHandle;
use crate::device::{
    AudioBackend, AudioDevices, CaptureSource, OutputDevice, SampleCallback, ScheduledVoice,
};
use crate::error::VoiceError;

/// Microphone adapter over the audio thread.
pub struct LocalCapture {
    handle: Arc<AudioThreadHandle>,
}

impl CaptureSource for LocalCapture {
    fn start(&self, on_samples: SampleCallback) -> Result<(), VoiceError> {
        self.handle.start_capture(on_samples)
    }

    fn stop(&self) {
        self.handle.stop_capture();
    }

    fn is_capturing(&self) -> bool {
        self.handle.is_capturing()
    }
}

/// Output adapter: the mix lives in [`OutputBus`], the handle keeps the
/// rodio stream pulling from it.
pub struct LocalOutput {
    bus: Arc<OutputBus>,
    _handle: Arc<AudioThreadHandle>,
}

impl OutputDevice for LocalOutput {
    fn sample_rate(&self) -> u32 {
        self.bus.sample_rate()
    }

    fn now(&self) -> u64 {
        self.bus.now()
    }

    fn start(&self, voice: ScheduledVoice) -> Result<(), VoiceError> {
        self.bus.start(voice)
    }

    fn snapshot(&self, window: &mut [f32]) -> usize {
        self.bus.snapshot(window)
    }

    fn set_gain(&self, gain: f32) {
        self.bus.set_gain(gain);
    }

    fn close(&self) {
        self.bus.close();
    }
}

/// Opens the default system microphone and speakers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAudioBackend;

impl LocalAudioBackend {
    /// Create the backend. Devices are only touched on `open`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AudioBackend for LocalAudioBackend {
    fn open(&self, config: &LiveAudioConfig) -> Result<AudioDevices, VoiceError> {
        config.validate()?;
        let (handle, bus) = AudioThreadHandle::spawn(config, true)?;
        let handle = Arc::new(handle);
        Ok(AudioDevices {
            capture: Box::new(LocalCapture {
                handle: Arc::clone(&handle),
            }),
            output: Arc::new(LocalOutput {
                bus,
                _handle: handle,
            }),
        })
    }

    fn open_output(&self, config: &LiveAudioConfig) -> Result<Arc<dyn OutputDevice>, VoiceError> {
        config.validate()?;
        let (handle, bus) = AudioThreadHandle::spawn(config, false)?;
        Ok(Arc::new(LocalOutput {
            bus,
            _handle: Arc::new(handle),
        }))
    }
}
