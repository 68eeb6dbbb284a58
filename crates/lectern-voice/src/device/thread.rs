//! Dedicated audio I/O thread.
//!
//! `cpal::Stream` (capture) and `rodio::OutputStream` (playback) are `!Send`
//! on some platforms, so both are created and dropped on one OS thread and
//! driven through [`AudioCommand`]s. The output mix itself ([`OutputBus`]) is
//! `Send + Sync` and is handed back to the caller at spawn time; the rodio
//! stream only pulls from it.

use std::sync::{Arc, mpsc};
use std::thread;

use crate::config::LiveAudioConfig;
use crate::device::{OutputDevice as _, SampleCallback};
use crate::device::bus::OutputBus;
use crate::device::capture::CpalCapture;
use crate::error::VoiceError;

enum AudioCommand {
    /// Route microphone samples to `on_samples`.
    StartCapture {
        on_samples: SampleCallback,
        reply: mpsc::Sender<Result<(), VoiceError>>,
    },

    /// Stop routing microphone samples (fire-and-forget).
    StopCapture,

    IsCapturing { reply: mpsc::Sender<bool> },

    /// Release all device resources and exit.
    Shutdown,
}

/// `Send + Sync` handle to the audio thread.
///
/// Dropping the handle shuts the thread down and joins it, which releases
/// the microphone and the output stream.
pub struct AudioThreadHandle {
    cmd_tx: mpsc::Sender<AudioCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AudioThreadHandle {
    /// Spawn the audio thread, open the output stream (and the microphone
    /// when `with_capture` is set) and return the handle with the output bus.
    ///
    /// Device errors are propagated back through a one-shot init channel.
    pub fn spawn(
        config: &LiveAudioConfig,
        with_capture: bool,
    ) -> Result<(Self, Arc<OutputBus>), VoiceError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<AudioCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), VoiceError>>();

        let bus = OutputBus::new(
            config.output_sample_rate,
            config.render_quantum,
            config.analyser_window,
            config.output_gain,
        );
        let input_rate = with_capture.then_some(config.input_sample_rate);
        let thread_bus = Arc::clone(&bus);

        let thread = thread::Builder::new()
            .name("lectern-audio".into())
            .spawn(move || Self::run(input_rate, thread_bus, cmd_rx, init_tx))
            .map_err(|e| {
                VoiceError::OutputStreamError(format!("failed to spawn audio thread: {e}"))
            })?;

        let handle = Self {
            cmd_tx,
            thread: Some(thread),
        };
        init_rx.recv().map_err(|_| VoiceError::AudioThreadDied)??;
        Ok((handle, bus))
    }

    /// Begin routing captured samples.
    pub fn start_capture(&self, on_samples: SampleCallback) -> Result<(), VoiceError> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(AudioCommand::StartCapture {
                on_samples,
                reply: tx,
            })
            .map_err(|_| VoiceError::AudioThreadDied)?;
        rx.recv().map_err(|_| VoiceError::AudioThreadDied)?
    }

    /// Stop routing captured samples.
    pub fn stop_capture(&self) {
        let _ = self.cmd_tx.send(AudioCommand::StopCapture);
    }

    /// Whether the microphone is routing samples. `false` if the thread died.
    pub fn is_capturing(&self) -> bool {
        let (tx, rx) = mpsc::channel();
        if self
            .cmd_tx
            .send(AudioCommand::IsCapturing { reply: tx })
            .is_err()
        {
            return false;
        }
        rx.recv().unwrap_or(false)
    }

    fn run(
        input_rate: Option<u32>,
        bus: Arc<OutputBus>,
        cmd_rx: mpsc::Receiver<AudioCommand>,
        init_tx: mpsc::Sender<Result<(), VoiceError>>,
    ) {
        let capture = match input_rate.map(CpalCapture::open).transpose() {
            Ok(c) => c,
            Err(e) => {
                let _ = init_tx.send(Err(e));
                return;
            }
        };

        let (_stream, stream_handle) = match rodio::OutputStream::try_default() {
            Ok(pair) => pair,
            Err(rodio::StreamError::NoDevice) => {
                let _ = init_tx.send(Err(VoiceError::NoOutputDevice));
                return;
            }
            Err(e) => {
                let _ = init_tx.send(Err(VoiceError::OutputStreamError(e.to_string())));
                return;
            }
        };

        if let Err(e) = stream_handle.play_raw(bus.source()) {
            let _ = init_tx.send(Err(VoiceError::OutputStreamError(e.to_string())));
            return;
        }

        tracing::debug!(
            sample_rate = bus.sample_rate(),
            capture = capture.is_some(),
            "Audio thread ready"
        );

        if init_tx.send(Ok(())).is_err() {
            return;
        }

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                AudioCommand::StartCapture { on_samples, reply } => {
                    let result = capture
                        .as_ref()
                        .ok_or(VoiceError::NoInputDevice)
                        .and_then(|c| c.start(on_samples));
                    let _ = reply.send(result);
                }
                AudioCommand::StopCapture => {
                    if let Some(c) = capture.as_ref() {
                        c.stop();
                    }
                }
                AudioCommand::IsCapturing { reply } => {
                    let _ = reply.send(capture.as_ref().is_some_and(CpalCapture::is_capturing));
                }
                AudioCommand::Shutdown => break,
            }
        }

        tracing::debug!("Audio thread shutting down");
        // `capture`, `_stream` and `stream_handle` drop here, on this thread.
    }
}

impl Drop for AudioThreadHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(AudioCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
