//! Seam to the remote conversational voice service.
//!
//! The concrete network protocol lives outside this crate. A transport
//! opens a session, accepts uplink frames and pushes [`ServerEvent`]s back
//! over a channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::error::VoiceError;
use crate::frame::EncodedFrame;
use crate::segment::EncodedSegment;

/// Events pushed by the remote service for one session.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// The service acknowledged the session; uplink may flow.
    Opened,

    /// One chunk of synthesized speech.
    Audio(EncodedSegment),

    /// Text produced alongside the audio (transcript or reply text).
    Text(String),

    /// The user spoke over the assistant: stop local playback now.
    Interrupted,

    /// The assistant finished its turn.
    TurnComplete,

    /// The service ended the session.
    Closed { reason: Option<String> },

    /// The service reported an error; the session is unusable.
    Error(String),
}

/// Receiving half of a session's server event stream.
pub type ServerEvents = mpsc::UnboundedReceiver<ServerEvent>;

/// Connection to the remote voice service.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Open a session. Events for it arrive on the returned receiver; the
    /// receiver ending without [`ServerEvent::Closed`] is a transport failure.
    async fn open(&self, config: &SessionConfig) -> Result<ServerEvents, VoiceError>;

    /// Send one captured frame.
    async fn send_audio(&self, frame: &EncodedFrame) -> Result<(), VoiceError>;

    /// Close the current session. Idempotent.
    async fn close(&self);
}
