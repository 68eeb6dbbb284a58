//! One-shot narration: play a single pre-rendered clip with progress.
//!
//! Narration reuses the live pipeline pieces: the clip is decoded by
//! [`SegmentDecoder`] and placed on the timeline by [`PlaybackScheduler`]
//! over an output-only device context. Progress is reported on a fixed
//! cadence as the rendered position within the clip, which stands still
//! while the narration is paused.
//!
//! Stop, pause and resume act on the clip's [`BufferHandle`] directly, so
//! they take effect at the next render quantum regardless of when the
//! progress task next runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{LiveAudioConfig, frames_to_duration};
use crate::device::{AudioBackend, OutputDevice};
use crate::error::VoiceError;
use crate::scheduler::{BufferHandle, BufferId, PlaybackScheduler, ScheduledBuffer};
use crate::segment::{EncodedSegment, SegmentDecoder};

/// Progress notifications for one narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationEvent {
    /// Playback position within the clip.
    Progress(Duration),

    /// The clip finished or was stopped. Always the last event.
    Ended,
}

/// A playing narration.
#[derive(Debug)]
pub struct Narration {
    events: mpsc::UnboundedReceiver<NarrationEvent>,
    playing: Playing,
    duration: Duration,
}

impl Narration {
    /// Total clip length.
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Next event, or `None` after [`NarrationEvent::Ended`] was delivered.
    pub async fn next_event(&mut self) -> Option<NarrationEvent> {
        self.events.recv().await
    }

    /// Stop playback early. Silent from the next render quantum. Idempotent.
    pub fn stop(&self) {
        self.playing.stop();
    }

    /// Hold playback at the current position.
    pub fn pause(&self) {
        self.playing.handle.pause();
    }

    /// Continue after [`pause`](Self::pause).
    pub fn resume(&self) {
        self.playing.handle.resume();
    }

    /// Whether playback is held.
    pub fn is_paused(&self) -> bool {
        self.playing.handle.is_paused()
    }

    /// Whether the narration has been stopped or has finished.
    pub fn is_finished(&self) -> bool {
        self.playing.cancel.is_cancelled()
    }
}

/// The clip a narration controls.
#[derive(Debug, Clone)]
struct Playing {
    handle: BufferHandle,
    cancel: CancellationToken,
}

impl Playing {
    fn stop(&self) {
        self.handle.stop();
        self.cancel.cancel();
    }
}

/// Plays narrations one at a time over a lazily opened output context.
pub struct OneShotPlayer {
    config: LiveAudioConfig,
    backend: Arc<dyn AudioBackend>,
    output: Option<Arc<dyn OutputDevice>>,
    current: Option<Playing>,
}

impl OneShotPlayer {
    /// Create a player. The output device is opened on the first `play`.
    pub fn new(config: LiveAudioConfig, backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            config,
            backend,
            output: None,
            current: None,
        }
    }

    /// Decode `segment` and start playing it, stopping any previous
    /// narration first.
    pub async fn play(&mut self, segment: EncodedSegment) -> Result<Narration, VoiceError> {
        self.stop();

        let output = self.output().await?;
        let decoder = SegmentDecoder::new(output.sample_rate(), 1);
        let buffer = decoder.decode(&segment)?;
        let duration = buffer.duration();

        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let mut scheduler = PlaybackScheduler::new(
            Arc::clone(&output),
            Arc::new(move |id: BufferId| {
                let _ = ended_tx.send(id);
            }),
        );
        let placed = scheduler.schedule(&buffer)?;
        let handle = scheduler
            .active()
            .get(placed.id)
            .cloned()
            .ok_or_else(|| VoiceError::OutputStreamError("narration was not admitted".into()))?;
        tracing::debug!(
            buffer_id = placed.id,
            frames = placed.frames,
            ?duration,
            "Narration started"
        );

        let playing = Playing {
            handle,
            cancel: CancellationToken::new(),
        };
        let (events_tx, events) = mpsc::unbounded_channel();
        tokio::spawn(track(
            scheduler,
            placed,
            ended_rx,
            events_tx,
            self.config.progress_interval(),
            playing.clone(),
        ));

        self.current = Some(playing.clone());
        Ok(Narration {
            events,
            playing,
            duration,
        })
    }

    /// Stop the current narration, if any.
    pub fn stop(&mut self) {
        if let Some(playing) = self.current.take() {
            playing.stop();
        }
    }

    /// Set the linear output gain. Applies to the open output at once and
    /// to the output opened by the next `play` otherwise.
    pub fn set_volume(&mut self, gain: f32) {
        let gain = gain.max(0.0);
        self.config.output_gain = gain;
        if let Some(output) = &self.output {
            output.set_gain(gain);
        }
    }

    /// Current linear output gain.
    pub const fn volume(&self) -> f32 {
        self.config.output_gain
    }

    /// Stop playback and release the output context.
    pub async fn close(&mut self) {
        self.stop();
        if let Some(output) = self.output.take() {
            output.close();
            let _ = tokio::task::spawn_blocking(move || drop(output)).await;
        }
    }

    async fn output(&mut self) -> Result<Arc<dyn OutputDevice>, VoiceError> {
        if let Some(output) = &self.output {
            return Ok(Arc::clone(output));
        }
        self.config.validate()?;
        let backend = Arc::clone(&self.backend);
        let config = self.config.clone();
        let output = tokio::task::spawn_blocking(move || backend.open_output(&config))
            .await
            .map_err(|_| VoiceError::AudioThreadDied)??;
        output.set_gain(self.config.output_gain);
        self.output = Some(Arc::clone(&output));
        Ok(output)
    }
}

impl Drop for OneShotPlayer {
    fn drop(&mut self) {
        self.stop();
        if let Some(output) = self.output.take() {
            output.close();
        }
    }
}

/// Report progress until the clip ends or `cancel` fires.
async fn track(
    mut scheduler: PlaybackScheduler,
    placed: ScheduledBuffer,
    mut ended: mpsc::UnboundedReceiver<BufferId>,
    events: mpsc::UnboundedSender<NarrationEvent>,
    interval: Duration,
    playing: Playing,
) {
    let rate = scheduler.output().sample_rate();
    let position = |played: u64| frames_to_duration(played.min(placed.frames), rate);
    let cancel = playing.cancel.clone();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                scheduler.interrupt();
                tracing::debug!(buffer_id = placed.id, "Narration stopped");
                break;
            }
            id = ended.recv() => {
                if let Some(id) = id {
                    scheduler.finished(id);
                }
                let _ = events.send(NarrationEvent::Progress(position(placed.frames)));
                tracing::debug!(buffer_id = placed.id, "Narration finished");
                break;
            }
            _ = ticker.tick() => {
                let played = playing.handle.played();
                if events.send(NarrationEvent::Progress(position(played))).is_err() {
                    scheduler.interrupt();
                    break;
                }
            }
        }
    }

    cancel.cancel();
    let _ = events.send(NarrationEvent::Ended);
}
