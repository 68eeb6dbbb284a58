//! Uplink sender: hands captured frames to the transport without blocking.
//!
//! The capture callback runs on the device thread and must never wait on
//! the network. Frames go into a single-slot mailbox: a newer frame
//! overwrites an older one the uplink task has not picked up yet, so a slow
//! network drops audio instead of stalling capture. The task waits for the
//! session to open, then forwards frames in capture order.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::frame::EncodedFrame;
use crate::session::{SessionState, mark_errored};
use crate::transport::VoiceTransport;

/// Producer half of the uplink mailbox. Moved into the capture callback.
pub struct UplinkSender {
    slot: watch::Sender<Option<EncodedFrame>>,
    state: watch::Receiver<SessionState>,
}

impl UplinkSender {
    /// Offer a frame for sending. Never blocks and never fails.
    ///
    /// Before the session opens, only the most recent frame is kept. Once the
    /// session is closed or errored, frames are discarded.
    pub fn submit(&self, frame: EncodedFrame) {
        if self.state.borrow().is_terminal() {
            return;
        }
        self.slot.send_replace(Some(frame));
    }
}

/// Consumer half of the uplink mailbox, driven by [`run`].
pub struct UplinkReceiver {
    slot: watch::Receiver<Option<EncodedFrame>>,
}

/// Create a mailbox gated on `state`.
pub fn channel(state: watch::Receiver<SessionState>) -> (UplinkSender, UplinkReceiver) {
    let (slot, rx) = watch::channel(None);
    (UplinkSender { slot, state }, UplinkReceiver { slot: rx })
}

/// Forward frames to `transport` until cancelled or the session ends.
///
/// A send failure moves the session to `Errored` and cancels the other
/// session tasks; the capture path never sees it.
pub async fn run(
    transport: Arc<dyn VoiceTransport>,
    mut frames: UplinkReceiver,
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
) {
    let mut state_rx = state.subscribe();
    let opened = tokio::select! {
        () = cancel.cancelled() => false,
        result = state_rx.wait_for(|s| *s == SessionState::Open || s.is_terminal()) => {
            matches!(result.as_deref(), Ok(SessionState::Open))
        }
    };
    if !opened {
        tracing::debug!("Uplink stopped before session opened");
        return;
    }

    let mut last_seq: Option<u64> = None;
    let mut sent: u64 = 0;
    let mut overwritten: u64 = 0;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = frames.slot.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let Some(frame) = frames.slot.borrow_and_update().clone() else {
            continue;
        };

        if let Some(last) = last_seq {
            let skipped = frame.seq.saturating_sub(last + 1);
            if skipped > 0 {
                overwritten += skipped;
                tracing::debug!(seq = frame.seq, skipped, "Uplink frames overwritten");
            }
        }
        last_seq = Some(frame.seq);

        if let Err(e) = transport.send_audio(&frame).await {
            if mark_errored(&state, &e.to_string()) {
                cancel.cancel();
            }
            break;
        }
        sent += 1;
    }

    tracing::debug!(sent, overwritten, "Uplink stopped");
}
