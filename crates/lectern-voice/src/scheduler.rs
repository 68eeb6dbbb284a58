//! Playback scheduler: gapless, in-order placement of decoded buffers.
//!
//! The scheduler keeps one cursor on the playback clock: the frame at which
//! the next buffer must begin so that it neither overlaps nor leaves a gap
//! after the previous one. Every buffer starts at
//! `max(cursor, clock.now())` and pushes the cursor forward by its own
//! length:
//!
//! ```text
//!   clock ──────────────────────────────────────────────▶
//!   seg 1 |██████████|
//!   seg 2            |█████|
//!   seg 3                  |████████████████████|
//!                                               ▲ cursor
//! ```
//!
//! If the network stalls past the cursor the next buffer starts at `now`
//! and the gap is audible; nothing tries to conceal it.
//!
//! Interruption (barge-in) stops every buffer in the active set at once and
//! resets the cursor so the next buffer starts immediately.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::device::{OutputDevice, ScheduledVoice};
use crate::error::VoiceError;
use crate::segment::PlaybackBuffer;

/// Identifies one scheduled buffer for the lifetime of a scheduler.
pub type BufferId = u64;

/// Notification routed back to the scheduler owner when a buffer ends.
pub type EndedNotifier = Arc<dyn Fn(BufferId) + Send + Sync>;

// ── BufferHandle ───────────────────────────────────────────────────

/// Control handle for one scheduled buffer.
///
/// Cloned between the active set, the output device and narration handles;
/// stopping or pausing through any clone affects the buffer. `stop` is
/// idempotent because a buffer may end naturally and be interrupted in the
/// same render quantum.
#[derive(Debug, Clone)]
pub struct BufferHandle {
    id: BufferId,
    state: Arc<HandleState>,
}

#[derive(Debug, Default)]
struct HandleState {
    stopped: AtomicBool,
    paused: AtomicBool,
    played: AtomicU64,
}

impl BufferHandle {
    /// Create a live handle.
    #[must_use]
    pub fn new(id: BufferId) -> Self {
        Self {
            id,
            state: Arc::default(),
        }
    }

    /// Buffer identifier.
    #[must_use]
    pub const fn id(&self) -> BufferId {
        self.id
    }

    /// Halt rendering. Returns `true` only for the call that stopped it.
    pub fn stop(&self) -> bool {
        !self.state.stopped.swap(true, Ordering::SeqCst)
    }

    /// Whether the buffer has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Hold the buffer at its current position. The output renders
    /// silence for it until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    /// Continue from where [`pause`](Self::pause) held the buffer.
    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    /// Whether the buffer is held.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    /// Frames of the buffer rendered so far.
    #[must_use]
    pub fn played(&self) -> u64 {
        self.state.played.load(Ordering::SeqCst)
    }

    /// Record render progress. Called by the output device.
    pub fn set_played(&self, frames: u64) {
        self.state.played.store(frames, Ordering::SeqCst);
    }
}

// ── ActiveBufferSet ────────────────────────────────────────────────

/// Buffers currently scheduled or playing.
#[derive(Debug, Default)]
pub struct ActiveBufferSet {
    handles: BTreeMap<BufferId, BufferHandle>,
}

impl ActiveBufferSet {
    fn insert(&mut self, handle: BufferHandle) {
        self.handles.insert(handle.id(), handle);
    }

    fn remove(&mut self, id: BufferId) -> Option<BufferHandle> {
        self.handles.remove(&id)
    }

    /// Stop every handle and empty the set. Returns how many were live.
    fn stop_all(&mut self) -> usize {
        let stopped = self.handles.values().filter(|h| h.stop()).count();
        self.handles.clear();
        stopped
    }

    /// Number of active buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Whether `id` is still scheduled or playing.
    #[must_use]
    pub fn contains(&self, id: BufferId) -> bool {
        self.handles.contains_key(&id)
    }

    /// Handle of an active buffer.
    #[must_use]
    pub fn get(&self, id: BufferId) -> Option<&BufferHandle> {
        self.handles.get(&id)
    }
}

// ── Scheduler ──────────────────────────────────────────────────────

/// Scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing scheduled.
    Idle,

    /// At least one buffer scheduled or playing.
    Scheduled,
}

/// Placement of one admitted buffer on the playback timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledBuffer {
    /// Buffer identifier (matches the end notification).
    pub id: BufferId,

    /// First frame of the buffer on the playback clock.
    pub start_frame: u64,

    /// Length in frames.
    pub frames: u64,

    /// Silence between the previous cursor and this start (network stall).
    pub gap_frames: u64,
}

impl ScheduledBuffer {
    /// Frame just after the last sample of this buffer.
    #[must_use]
    pub const fn end_frame(&self) -> u64 {
        self.start_frame + self.frames
    }
}

/// Greedy sequential scheduler over an [`OutputDevice`].
///
/// Owned by exactly one task; every mutation goes through `&mut self`.
pub struct PlaybackScheduler {
    output: Arc<dyn OutputDevice>,
    on_ended: EndedNotifier,
    cursor: u64,
    active: ActiveBufferSet,
    next_id: BufferId,
}

impl PlaybackScheduler {
    /// Create a scheduler. `on_ended` is called (from the render thread)
    /// when a buffer finishes naturally; the owner should route it to
    /// [`finished`](Self::finished).
    pub fn new(output: Arc<dyn OutputDevice>, on_ended: EndedNotifier) -> Self {
        Self {
            output,
            on_ended,
            cursor: 0,
            active: ActiveBufferSet::default(),
            next_id: 0,
        }
    }

    /// Admit `buffer` directly after everything already scheduled.
    pub fn schedule(&mut self, buffer: &PlaybackBuffer) -> Result<ScheduledBuffer, VoiceError> {
        let now = self.output.now();
        let start_frame = self.cursor.max(now);
        let frames = buffer.frames();
        let gap_frames = if self.cursor > 0 {
            now.saturating_sub(self.cursor)
        } else {
            0
        };

        let id = self.next_id;
        self.next_id += 1;
        let handle = BufferHandle::new(id);

        let notify = Arc::clone(&self.on_ended);
        self.output.start(ScheduledVoice {
            handle: handle.clone(),
            samples: Arc::clone(buffer.samples()),
            start_frame,
            on_end: Some(Box::new(move || notify(id))),
        })?;

        self.active.insert(handle);
        self.cursor = start_frame + frames;

        if gap_frames > 0 {
            tracing::trace!(buffer_id = id, gap_frames, "Playback underrun, resuming");
        }
        tracing::trace!(
            buffer_id = id,
            start_frame,
            frames,
            cursor = self.cursor,
            "Buffer scheduled"
        );

        Ok(ScheduledBuffer {
            id,
            start_frame,
            frames,
            gap_frames,
        })
    }

    /// A buffer finished naturally; drop it from the active set.
    ///
    /// Unknown ids (already cleared by an interruption) are ignored.
    pub fn finished(&mut self, id: BufferId) -> bool {
        let removed = self.active.remove(id).is_some();
        if removed && self.active.is_empty() {
            tracing::trace!(cursor = self.cursor, "Playback queue drained");
        }
        removed
    }

    /// Barge-in: stop every active buffer now, clear the set and reset the
    /// cursor so the next buffer starts at `clock.now()`.
    ///
    /// Returns the number of buffers that were stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.stop_all();
        self.cursor = 0;
        tracing::debug!(stopped, "Playback interrupted");
        stopped
    }

    /// Current cursor (frame where the next buffer would start, if not late).
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Active buffers.
    #[must_use]
    pub const fn active(&self) -> &ActiveBufferSet {
        &self.active
    }

    /// State machine position.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        if self.active.is_empty() {
            SchedulerState::Idle
        } else {
            SchedulerState::Scheduled
        }
    }

    /// The output device this scheduler renders to.
    #[must_use]
    pub fn output(&self) -> &Arc<dyn OutputDevice> {
        &self.output
    }
}
