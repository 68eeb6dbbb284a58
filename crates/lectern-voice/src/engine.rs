//! Playback engine: the single owner of the scheduler during a session.
//!
//! Downlink segments, barge-in interruptions and end-of-buffer notifications
//! from the render thread all arrive as [`EngineCommand`]s on one channel
//! and are applied strictly in arrival order. Nothing else touches the
//! cursor or the active set, so no locks are needed around them.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::OutputDevice;
use crate::scheduler::{BufferId, PlaybackScheduler, SchedulerState};
use crate::segment::{EncodedSegment, SegmentDecoder};

/// Messages processed by the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// A downlink segment to decode and schedule.
    Segment(EncodedSegment),

    /// Stop everything that is scheduled or playing.
    Interrupt,

    /// A buffer played to its end.
    BufferEnded(BufferId),

    /// Report the scheduler's position.
    Snapshot {
        reply: oneshot::Sender<EngineSnapshot>,
    },

    /// Stop all playback and exit.
    Shutdown,
}

/// Point-in-time view of the playback timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    /// Frame where the next buffer would start if it is not late.
    pub cursor: u64,

    /// Buffers scheduled or playing.
    pub active: usize,

    /// Scheduler state.
    pub state: SchedulerState,

    /// Segments admitted since the engine started.
    pub scheduled: u64,

    /// Segments dropped because they failed to decode.
    pub dropped: u64,

    /// Interruptions applied.
    pub interruptions: u64,
}

/// Sending half used by the session and the event pump.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    /// Queue a segment for decoding and scheduling.
    pub fn enqueue(&self, segment: EncodedSegment) {
        let _ = self.tx.send(EngineCommand::Segment(segment));
    }

    /// Barge-in: stop all playback at the next render quantum.
    pub fn interrupt(&self) {
        let _ = self.tx.send(EngineCommand::Interrupt);
    }

    /// Ask the engine to stop playback and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown);
    }

    /// Current timeline position, or `None` if the engine has exited.
    pub async fn snapshot(&self) -> Option<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(EngineCommand::Snapshot { reply }).ok()?;
        rx.await.ok()
    }
}

/// The engine task state.
pub struct PlaybackEngine {
    scheduler: PlaybackScheduler,
    decoder: SegmentDecoder,
    rx: mpsc::UnboundedReceiver<EngineCommand>,
    scheduled: u64,
    dropped: u64,
    interruptions: u64,
}

impl PlaybackEngine {
    /// Spawn the engine over `output`. It runs until shut down or `cancel`
    /// fires, and stops any remaining playback on the way out.
    pub fn spawn(
        output: Arc<dyn OutputDevice>,
        cancel: CancellationToken,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let ended_tx = tx.clone();
        let on_ended = Arc::new(move |id: BufferId| {
            let _ = ended_tx.send(EngineCommand::BufferEnded(id));
        });

        let decoder = SegmentDecoder::new(output.sample_rate(), 1);
        let engine = Self {
            scheduler: PlaybackScheduler::new(output, on_ended),
            decoder,
            rx,
            scheduled: 0,
            dropped: 0,
            interruptions: 0,
        };

        let task = tokio::spawn(engine.run(cancel));
        (EngineHandle { tx }, task)
    }

    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let cmd = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                cmd = self.rx.recv() => cmd,
            };

            match cmd {
                Some(EngineCommand::Segment(segment)) => self.admit(&segment),
                Some(EngineCommand::Interrupt) => {
                    self.scheduler.interrupt();
                    self.interruptions += 1;
                }
                Some(EngineCommand::BufferEnded(id)) => {
                    self.scheduler.finished(id);
                }
                Some(EngineCommand::Snapshot { reply }) => {
                    let _ = reply.send(self.snapshot());
                }
                Some(EngineCommand::Shutdown) | None => break,
            }
        }

        let stopped = self.scheduler.interrupt();
        tracing::debug!(
            stopped,
            scheduled = self.scheduled,
            dropped = self.dropped,
            "Playback engine stopped"
        );
    }

    fn admit(&mut self, segment: &EncodedSegment) {
        let buffer = match self.decoder.decode(segment) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.dropped += 1;
                tracing::warn!(%e, bytes = segment.payload.len(), "Dropping undecodable segment");
                return;
            }
        };

        match self.scheduler.schedule(&buffer) {
            Ok(_) => self.scheduled += 1,
            Err(e) => tracing::warn!(%e, "Output rejected segment"),
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            cursor: self.scheduler.cursor(),
            active: self.scheduler.active().len(),
            state: self.scheduler.state(),
            scheduled: self.scheduled,
            dropped: self.dropped,
            interruptions: self.interruptions,
        }
    }
}
