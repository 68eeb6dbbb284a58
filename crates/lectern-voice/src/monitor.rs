//! Amplitude monitor: a volume level of the output mix for visualizers.
//!
//! On a fixed cadence the monitor reads the most recent post-gain output
//! samples from the device tap and reduces them to one value in `0.0..=1.0`.
//! It runs for as long as a session is open, whether or not anything is
//! playing, and yields approximately zero during silence.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::device::OutputDevice;

/// Receives one volume level per monitor tick.
pub type VolumeCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// The registered volume subscriber, shared between the session and the
/// monitor task. At most one subscriber at a time.
#[derive(Clone, Default)]
pub struct VolumeSubscriber {
    inner: Arc<RwLock<Option<VolumeCallback>>>,
}

impl VolumeSubscriber {
    /// Replace the subscriber.
    pub fn set(&self, callback: VolumeCallback) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(callback);
        }
    }

    /// Remove the subscriber; levels are discarded until a new one is set.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.inner.write() {
            slot.take();
        }
    }

    /// Current subscriber, if any.
    pub fn get(&self) -> Option<VolumeCallback> {
        self.inner.read().ok().and_then(|slot| slot.clone())
    }
}

impl std::fmt::Debug for VolumeSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeSubscriber")
            .field("subscribed", &self.get().is_some())
            .finish()
    }
}

/// Mean absolute magnitude of `samples`, clamped to `0.0..=1.0`.
///
/// Empty input is silence.
#[must_use]
pub fn mean_magnitude(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s.abs()).sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / samples.len() as f32;
    mean.clamp(0.0, 1.0)
}

/// Periodic reader of the output tap.
pub struct AmplitudeMonitor {
    output: Arc<dyn OutputDevice>,
    window: Vec<f32>,
    interval: Duration,
}

impl AmplitudeMonitor {
    /// Monitor the latest `window_len` samples of `output` every `interval`.
    pub fn new(output: Arc<dyn OutputDevice>, window_len: usize, interval: Duration) -> Self {
        Self {
            output,
            window: vec![0.0; window_len.max(1)],
            interval,
        }
    }

    /// Read the tap once and reduce it to a level.
    pub fn sample(&mut self) -> f32 {
        let written = self.output.snapshot(&mut self.window);
        mean_magnitude(&self.window[..written.min(self.window.len())])
    }

    /// Run until `cancel` fires, delivering one level per tick to the
    /// current subscriber. Missed ticks are skipped, not bunched.
    pub fn spawn(mut self, subscriber: VolumeSubscriber, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Some(callback) = subscriber.get() {
                    callback(self.sample());
                }
            }
            tracing::trace!("Amplitude monitor stopped");
        })
    }
}
