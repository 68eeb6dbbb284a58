//! Output mix bus: sample-accurate voice mixing with a playback clock.
//!
//! rodio's `Sink` only queues sources back to back, it cannot start a source
//! at an absolute time or stop one source among many. [`OutputBus`] fills
//! that gap: it mixes any number of [`ScheduledVoice`]s, each starting at an
//! exact frame on the bus clock, and counts every frame it renders so the
//! scheduler has a monotonic clock to place buffers against.
//!
//! Rendering happens in quanta of `render_quantum` frames pulled by
//! [`BusSource`], the `rodio::Source` handed to the output stream. Voices
//! whose handle was stopped are dropped at the next quantum; paused voices
//! are held in place and render silence. After gain, each
//! quantum is copied into a small ring that the amplitude monitor reads.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::device::{EndCallback, OutputDevice, ScheduledVoice};
use crate::error::VoiceError;
use crate::scheduler::BufferHandle;

/// A voice being mixed.
struct Voice {
    handle: BufferHandle,
    samples: Arc<[f32]>,
    start_frame: u64,
    position: usize,
    on_end: Option<EndCallback>,
}

/// Fixed-size ring of the most recent output samples.
struct TapRing {
    buf: Vec<f32>,
    head: usize,
    filled: usize,
}

impl TapRing {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity.max(1)],
            head: 0,
            filled: 0,
        }
    }

    fn push(&mut self, samples: &[f32]) {
        let cap = self.buf.len();
        for &s in samples {
            self.buf[self.head] = s;
            self.head = (self.head + 1) % cap;
        }
        self.filled = (self.filled + samples.len()).min(cap);
    }

    /// Copy the newest `min(window.len(), filled)` samples, oldest first.
    fn copy_latest(&self, window: &mut [f32]) -> usize {
        let cap = self.buf.len();
        let n = window.len().min(self.filled);
        let start = (self.head + cap - n) % cap;
        for (i, slot) in window.iter_mut().take(n).enumerate() {
            *slot = self.buf[(start + i) % cap];
        }
        n
    }
}

/// Shared mixer state. `Send + Sync`; the render side and the scheduling
/// side meet only through the voice list lock.
pub struct OutputBus {
    sample_rate: u32,
    render_quantum: usize,
    clock: AtomicU64,
    gain_bits: AtomicU32,
    closed: AtomicBool,
    voices: Mutex<Vec<Voice>>,
    tap: Mutex<TapRing>,
}

impl OutputBus {
    /// Create a bus rendering at `sample_rate` in quanta of `render_quantum`
    /// frames, keeping the last `tap_len` samples for analysis.
    #[must_use]
    pub fn new(sample_rate: u32, render_quantum: usize, tap_len: usize, gain: f32) -> Arc<Self> {
        Arc::new(Self {
            sample_rate,
            render_quantum: render_quantum.max(1),
            clock: AtomicU64::new(0),
            gain_bits: AtomicU32::new(gain.to_bits()),
            closed: AtomicBool::new(false),
            voices: Mutex::new(Vec::new()),
            tap: Mutex::new(TapRing::new(tap_len)),
        })
    }

    /// Source that pulls audio from this bus, for `OutputStreamHandle::play_raw`.
    #[must_use]
    pub fn source(self: &Arc<Self>) -> BusSource {
        BusSource {
            bus: Arc::clone(self),
            block: vec![0.0; self.render_quantum],
            index: self.render_quantum,
        }
    }

    /// Number of voices still mixing (scheduled in the future or playing).
    #[must_use]
    pub fn voice_count(&self) -> usize {
        self.voices.lock().map_or(0, |v| v.len())
    }

    /// Whether [`close`](OutputDevice::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mix the next `out.len()` frames into `out` and advance the clock.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let block_start = self.clock.load(Ordering::SeqCst);
        let mut ended: Vec<EndCallback> = Vec::new();

        if !self.is_closed() {
            if let Ok(mut voices) = self.voices.lock() {
                voices.retain_mut(|voice| mix_voice(voice, out, block_start, &mut ended));
            }

            let gain = f32::from_bits(self.gain_bits.load(Ordering::Relaxed));
            if (gain - 1.0).abs() > f32::EPSILON {
                out.iter_mut().for_each(|s| *s *= gain);
            }
        }

        if let Ok(mut tap) = self.tap.lock() {
            tap.push(out);
        }
        self.clock.fetch_add(out.len() as u64, Ordering::SeqCst);

        // Callbacks run outside the voice lock: they may schedule more audio.
        for cb in ended {
            cb();
        }
    }
}

/// Mix one voice into the block. Returns `false` once the voice is done.
fn mix_voice(
    voice: &mut Voice,
    out: &mut [f32],
    block_start: u64,
    ended: &mut Vec<EndCallback>,
) -> bool {
    if voice.handle.is_stopped() {
        return false;
    }
    if voice.handle.is_paused() {
        return true;
    }

    let block_len = out.len() as u64;
    let offset = voice.start_frame.saturating_sub(block_start);
    if offset >= block_len {
        return true;
    }

    #[allow(clippy::cast_possible_truncation)]
    let offset = offset as usize;
    let remaining = &voice.samples[voice.position..];
    let n = (out.len() - offset).min(remaining.len());
    for (dst, src) in out[offset..offset + n].iter_mut().zip(remaining) {
        *dst += *src;
    }
    voice.position += n;
    voice.handle.set_played(voice.position as u64);

    if voice.position >= voice.samples.len() {
        if let Some(cb) = voice.on_end.take() {
            ended.push(cb);
        }
        return false;
    }
    true
}

impl OutputDevice for OutputBus {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn now(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    fn start(&self, voice: ScheduledVoice) -> Result<(), VoiceError> {
        if self.is_closed() {
            return Err(VoiceError::OutputStreamError("output bus is closed".to_string()));
        }
        let mut voices = self
            .voices
            .lock()
            .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;
        voices.push(Voice {
            handle: voice.handle,
            samples: voice.samples,
            start_frame: voice.start_frame,
            position: 0,
            on_end: voice.on_end,
        });
        Ok(())
    }

    fn snapshot(&self, window: &mut [f32]) -> usize {
        self.tap.lock().map_or(0, |tap| tap.copy_latest(window))
    }

    fn set_gain(&self, gain: f32) {
        self.gain_bits.store(gain.max(0.0).to_bits(), Ordering::Relaxed);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut voices) = self.voices.lock() {
            for voice in voices.drain(..) {
                voice.handle.stop();
            }
        }
        tracing::debug!("Output bus closed");
    }
}

// ── rodio source ───────────────────────────────────────────────────

/// Endless mono `rodio::Source` rendering the bus one quantum at a time.
///
/// Ends (returns `None`) once the bus is closed so the output stream drops it.
pub struct BusSource {
    bus: Arc<OutputBus>,
    block: Vec<f32>,
    index: usize,
}

impl Iterator for BusSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.index >= self.block.len() {
            if self.bus.is_closed() {
                return None;
            }
            self.bus.render(&mut self.block);
            self.index = 0;
        }
        let sample = self.block[self.index];
        self.index += 1;
        Some(sample)
    }
}

impl rodio::Source for BusSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.bus.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
