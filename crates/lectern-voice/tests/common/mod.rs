//! Shared fakes for the integration tests.
//!
//! Output is the real [`OutputBus`] rendered by hand, so the playback clock
//! only moves when a test calls [`advance`]. Capture and transport are
//! in-memory stand-ins; no audio hardware or network is touched.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lectern_voice::device::{
    AudioBackend, AudioDevices, CaptureSource, OutputBus, OutputDevice, SampleCallback,
    ScheduledVoice,
};
use lectern_voice::{
    EncodedFrame, LiveAudioConfig, ServerEvent, ServerEvents, SessionConfig, VoiceError,
    VoiceTransport,
};
use tokio::sync::mpsc;

pub const OUTPUT_RATE: u32 = 24_000;

/// Frames in `secs` seconds at the output rate.
pub fn secs(secs: f64) -> u64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let frames = (secs * f64::from(OUTPUT_RATE)).round() as u64;
    frames
}

/// A bus like the one the local backend opens, unattached to any device.
pub fn bus() -> Arc<OutputBus> {
    let config = LiveAudioConfig::default();
    OutputBus::new(
        config.output_sample_rate,
        config.render_quantum,
        config.analyser_window,
        config.output_gain,
    )
}

/// Render `frames` frames in render quanta, advancing the clock.
pub fn advance(bus: &OutputBus, frames: u64) {
    let mut block = vec![0.0; 128];
    let mut left = frames;
    while left > 0 {
        #[allow(clippy::cast_possible_truncation)]
        let n = left.min(128) as usize;
        bus.render(&mut block[..n]);
        left -= n as u64;
    }
}

/// Render up to the absolute clock position `frame`.
pub fn advance_to(bus: &OutputBus, frame: u64) {
    advance(bus, frame.saturating_sub(bus.now()));
}

/// Raw PCM16 LE bytes of `frames` samples at constant `level`.
pub fn pcm(frames: u64, level: i16) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    let frames = frames as usize;
    std::iter::repeat_n(level.to_le_bytes(), frames)
        .flatten()
        .collect()
}

// ── Output ─────────────────────────────────────────────────────────

/// Wraps a bus and counts how many outputs are alive at once.
pub struct TrackedOutput {
    bus: Arc<OutputBus>,
    live: Arc<AtomicUsize>,
}

impl OutputDevice for TrackedOutput {
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

impl Drop for TrackedOutput {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Capture ────────────────────────────────────────────────────────

/// Capture whose samples are pushed by the test.
#[derive(Clone, Default)]
pub struct FakeMic {
    callback: Arc<Mutex<Option<SampleCallback>>>,
}

impl FakeMic {
    /// Deliver `samples` as if the device callback fired.
    pub fn feed(&self, samples: &[f32]) {
        if let Some(cb) = self.callback.lock().unwrap().as_mut() {
            cb(samples);
        }
    }

    pub fn is_live(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }
}

impl CaptureSource for FakeMic {
    fn start(&self, on_samples: SampleCallback) -> Result<(), VoiceError> {
        *self.callback.lock().unwrap() = Some(on_samples);
        Ok(())
    }
    fn stop(&self) {
        self.callback.lock().unwrap().take();
    }
    fn is_capturing(&self) -> bool {
        self.is_live()
    }
}

// ── Backend ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeBackend {
    pub mic: FakeMic,
    pub deny_microphone: AtomicBool,
    buses: Mutex<Vec<Arc<OutputBus>>>,
    live: Arc<AtomicUsize>,
    max_live: AtomicUsize,
    opened: AtomicUsize,
}

impl FakeBackend {
    /// Bus of the most recently opened output.
    pub fn last_bus(&self) -> Arc<OutputBus> {
        Arc::clone(self.buses.lock().unwrap().last().expect("no output opened"))
    }

    /// Outputs currently alive.
    pub fn live_outputs(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of outputs alive at the same time.
    pub fn max_live_outputs(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn new_output(&self) -> Arc<dyn OutputDevice> {
        let bus = bus();
        self.buses.lock().unwrap().push(Arc::clone(&bus));
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Arc::new(TrackedOutput {
            bus,
            live: Arc::clone(&self.live),
        })
    }
}

impl AudioBackend for FakeBackend {
    fn open(&self, _config: &LiveAudioConfig) -> Result<AudioDevices, VoiceError> {
        if self.deny_microphone.load(Ordering::SeqCst) {
            return Err(VoiceError::MicrophonePermissionDenied);
        }
        Ok(AudioDevices {
            capture: Box::new(self.mic.clone()),
            output: self.new_output(),
        })
    }

    fn open_output(&self, _config: &LiveAudioConfig) -> Result<Arc<dyn OutputDevice>, VoiceError> {
        Ok(self.new_output())
    }
}

// ── Transport ──────────────────────────────────────────────────────

/// In-memory transport. The test plays the server through [`push`](Self::push).
#[derive(Default)]
pub struct FakeTransport {
    events: Mutex<Option<mpsc::UnboundedSender<ServerEvent>>>,
    sent: Mutex<Vec<EncodedFrame>>,
    pub fail_open: AtomicBool,
    pub fail_send: AtomicBool,
    closes: AtomicUsize,
}

impl FakeTransport {
    /// Deliver a server event to the open session.
    pub fn push(&self, event: ServerEvent) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// End the server event stream without a close event.
    pub fn drop_stream(&self) {
        self.events.lock().unwrap().take();
    }

    /// Sequence numbers of frames received so far.
    pub fn sent_seqs(&self) -> Vec<u64> {
        self.sent.lock().unwrap().iter().map(|f| f.seq).collect()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn open(&self, _config: &SessionConfig) -> Result<ServerEvents, VoiceError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(VoiceError::Transport("connection refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn send_audio(&self, frame: &EncodedFrame) -> Result<(), VoiceError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(VoiceError::Transport("socket reset".into()));
        }
        self.sent.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().take();
    }
}
