//! Live session lifecycle: opens devices, wires the pipeline, tears it down.
//!
//! ```text
//!   Idle ──connect──▶ Connecting ──Opened──▶ Open ──disconnect──▶ Closed
//!                         │                   │
//!                         └──── fatal error ──┴──▶ Errored
//! ```
//!
//! While a session is connected it owns:
//!
//! - the capture source, wired capture → [`FrameEncoder`] → uplink mailbox;
//! - the output device, shared by the playback engine and the amplitude
//!   monitor;
//! - one task each for the engine, the monitor, the uplink and the server
//!   event pump, all cancelled through one [`CancellationToken`].
//!
//! At most one session is active per [`LiveSession`]; connecting again
//! disconnects the previous session first, so two output contexts are never
//! open at the same time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{LiveAudioConfig, SessionConfig};
use crate::device::{AudioBackend, AudioDevices, CaptureSource, OutputDevice, SampleCallback};
use crate::engine::{EngineHandle, EngineSnapshot, PlaybackEngine};
use crate::error::VoiceError;
use crate::frame::FrameEncoder;
use crate::monitor::{AmplitudeMonitor, VolumeSubscriber};
use crate::transport::{ServerEvent, ServerEvents, VoiceTransport};
use crate::uplink;

// ── Session state ──────────────────────────────────────────────────

/// Lifecycle position of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session has been started.
    Idle,

    /// Devices are open and the remote session is being established.
    Connecting,

    /// The remote service acknowledged the session; audio flows both ways.
    Open,

    /// The session was closed by the user or the remote service.
    Closed,

    /// The session failed; uplink is disabled until the next `connect`.
    Errored,
}

impl SessionState {
    /// Closed or errored: nothing flows any more.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

type StateTx = Arc<watch::Sender<SessionState>>;

fn transition(state: &watch::Sender<SessionState>, to: SessionState) {
    state.send_if_modified(|current| {
        if *current == to {
            return false;
        }
        tracing::debug!(old = ?*current, new = ?to, "Session state transition");
        *current = to;
        true
    });
}

/// `Connecting` → `Open`. Returns whether the state changed.
fn mark_open(state: &watch::Sender<SessionState>) -> bool {
    state.send_if_modified(|current| {
        if *current != SessionState::Connecting {
            return false;
        }
        *current = SessionState::Open;
        true
    })
}

/// Move a live session to `Closed` after the remote side ended it.
fn mark_closed(state: &watch::Sender<SessionState>) -> bool {
    state.send_if_modified(|current| {
        if current.is_terminal() || *current == SessionState::Idle {
            return false;
        }
        *current = SessionState::Closed;
        true
    })
}

/// Move a live session to `Errored`, logging `reason` once.
///
/// Returns `false` if the session had already ended, in which case nothing
/// is logged.
pub(crate) fn mark_errored(state: &watch::Sender<SessionState>, reason: &str) -> bool {
    state.send_if_modified(|current| {
        if current.is_terminal() {
            return false;
        }
        tracing::error!(reason, "Voice session failed");
        *current = SessionState::Errored;
        true
    })
}

// ── LiveSession ────────────────────────────────────────────────────

/// Receives text produced by the remote service.
pub type TextCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Resources of one connected session.
struct ActiveSession {
    id: u64,
    capture: Box<dyn CaptureSource>,
    output: Arc<dyn OutputDevice>,
    engine: EngineHandle,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ActiveSession {
    /// Stop capture, cancel every task, wait for them and release the
    /// devices. The audio thread is joined off the async executor.
    async fn release(self) {
        let Self {
            id,
            capture,
            output,
            engine,
            cancel,
            tasks,
        } = self;

        capture.stop();
        engine.shutdown();
        cancel.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(session = id, %e, "Session task ended abnormally");
            }
        }
        output.close();

        let released = tokio::task::spawn_blocking(move || drop((capture, output))).await;
        if let Err(e) = released {
            tracing::warn!(session = id, %e, "Failed to release audio devices");
        }
    }
}

/// A duplex voice conversation with a remote service.
pub struct LiveSession {
    audio: LiveAudioConfig,
    session: SessionConfig,
    backend: Arc<dyn AudioBackend>,
    transport: Arc<dyn VoiceTransport>,
    state: StateTx,
    volume: VolumeSubscriber,
    next_id: u64,
    active: Option<ActiveSession>,
}

impl LiveSession {
    /// Create an idle session. Nothing is opened until [`connect`](Self::connect).
    pub fn new(
        audio: LiveAudioConfig,
        backend: Arc<dyn AudioBackend>,
        transport: Arc<dyn VoiceTransport>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            audio,
            session: SessionConfig::default(),
            backend,
            transport,
            state: Arc::new(state),
            volume: VolumeSubscriber::default(),
            next_id: 0,
            active: None,
        }
    }

    /// Use `session` when opening the remote session.
    #[must_use]
    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Audio configuration.
    pub const fn audio_config(&self) -> &LiveAudioConfig {
        &self.audio
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Identifier of the connected session, if any. Increments per `connect`.
    pub fn session_id(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Start a session. `on_text` receives text events from the remote
    /// service.
    ///
    /// If a session is already active it is disconnected first. A denied
    /// microphone returns [`VoiceError::MicrophonePermissionDenied`] and
    /// leaves the session `Idle`.
    pub async fn connect<F>(&mut self, on_text: F) -> Result<(), VoiceError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        if self.active.is_some() {
            tracing::info!("Replacing active voice session");
            self.disconnect().await;
        }
        self.audio.validate()?;

        self.next_id += 1;
        let id = self.next_id;
        transition(&self.state, SessionState::Connecting);

        let AudioDevices { capture, output } = match self.open_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!(session = id, %e, "Failed to open audio devices");
                transition(&self.state, SessionState::Idle);
                return Err(e);
            }
        };

        output.set_gain(self.audio.output_gain);

        let cancel = CancellationToken::new();
        let (engine, engine_task) = PlaybackEngine::spawn(Arc::clone(&output), cancel.clone());
        let monitor_task = AmplitudeMonitor::new(
            Arc::clone(&output),
            self.audio.analyser_window,
            self.audio.monitor_interval(),
        )
        .spawn(self.volume.clone(), cancel.clone());

        let mut active = ActiveSession {
            id,
            capture,
            output,
            engine: engine.clone(),
            cancel: cancel.clone(),
            tasks: vec![engine_task, monitor_task],
        };

        let events = match self.transport.open(&self.session).await {
            Ok(events) => events,
            Err(e) => {
                mark_errored(&self.state, &e.to_string());
                active.release().await;
                return Err(e);
            }
        };

        let (uplink_tx, uplink_rx) = uplink::channel(self.state.subscribe());
        active.tasks.push(tokio::spawn(uplink::run(
            Arc::clone(&self.transport),
            uplink_rx,
            Arc::clone(&self.state),
            cancel.clone(),
        )));
        active.tasks.push(tokio::spawn(pump_events(
            events,
            engine,
            Arc::new(on_text),
            Arc::clone(&self.state),
            cancel,
            id,
        )));

        let mut encoder = FrameEncoder::new(self.audio.frame_size, self.audio.input_sample_rate);
        let on_samples: SampleCallback = Box::new(move |samples: &[f32]| {
            encoder.push(samples, |frame| uplink_tx.submit(frame));
        });
        if let Err(e) = active.capture.start(on_samples) {
            mark_errored(&self.state, &e.to_string());
            self.transport.close().await;
            active.release().await;
            return Err(e);
        }

        tracing::info!(session = id, model = %self.session.model, "Voice session connecting");
        self.active = Some(active);
        Ok(())
    }

    /// End the session: stop capture and playback, close the remote
    /// session and release both device contexts. Idempotent.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let id = active.id;

        active.capture.stop();
        active.cancel.cancel();
        self.transport.close().await;
        active.release().await;

        transition(&self.state, SessionState::Closed);
        tracing::info!(session = id, "Voice session closed");
    }

    /// Stop local playback immediately (local barge-in).
    pub fn interrupt(&self) {
        if let Some(active) = &self.active {
            active.engine.interrupt();
        }
    }

    /// Playback timeline of the connected session.
    pub async fn playback(&self) -> Option<EngineSnapshot> {
        match &self.active {
            Some(active) => active.engine.snapshot().await,
            None => None,
        }
    }

    /// Register the output volume subscriber, replacing any previous one.
    pub fn on_output_volume<F>(&self, callback: F)
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        self.volume.set(Arc::new(callback));
    }

    /// Remove the output volume subscriber.
    pub fn clear_output_volume(&self) {
        self.volume.clear();
    }

    /// Set the linear playback gain. Applies to the connected session at
    /// once and is kept for later sessions.
    pub fn set_volume(&mut self, gain: f32) {
        let gain = gain.max(0.0);
        self.audio.output_gain = gain;
        if let Some(active) = &self.active {
            active.output.set_gain(gain);
        }
    }

    async fn open_devices(&self) -> Result<AudioDevices, VoiceError> {
        let backend = Arc::clone(&self.backend);
        let config = self.audio.clone();
        tokio::task::spawn_blocking(move || backend.open(&config))
            .await
            .map_err(|_| VoiceError::AudioThreadDied)?
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.capture.stop();
        active.cancel.cancel();
        active.output.close();

        let transport = Arc::clone(&self.transport);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { transport.close().await });
        }
        tracing::debug!(session = active.id, "Voice session dropped while connected");
        // Devices drop here, which joins the audio thread.
    }
}

// ── Event pump ─────────────────────────────────────────────────────

async fn pump_events(
    mut events: ServerEvents,
    engine: EngineHandle,
    on_text: TextCallback,
    state: StateTx,
    cancel: CancellationToken,
    session: u64,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(ServerEvent::Opened) => {
                if mark_open(&state) {
                    tracing::info!(session, "Voice session open");
                }
            }
            Some(ServerEvent::Audio(segment)) => engine.enqueue(segment),
            Some(ServerEvent::Text(text)) => on_text(text),
            Some(ServerEvent::Interrupted) => {
                tracing::debug!(session, "Remote interruption");
                engine.interrupt();
            }
            Some(ServerEvent::TurnComplete) => {
                tracing::debug!(session, "Turn complete");
            }
            Some(ServerEvent::Closed { reason }) => {
                if mark_closed(&state) {
                    tracing::info!(session, reason = reason.as_deref(), "Remote closed voice session");
                }
                break;
            }
            Some(ServerEvent::Error(message)) => {
                if mark_errored(&state, &message) {
                    cancel.cancel();
                }
                break;
            }
            None => {
                if mark_errored(&state, "server event stream ended") {
                    cancel.cancel();
                }
                break;
            }
        }
    }
}
