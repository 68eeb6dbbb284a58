//! Live voice error types.

/// Errors that can occur in the live voice pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// No audio input device found.
    #[error("No audio input device found")]
    NoInputDevice,

    /// No audio output device found.
    #[error("No audio output device found")]
    NoOutputDevice,

    /// Microphone permission denied.
    #[error("Microphone permission denied")]
    MicrophonePermissionDenied,

    /// Failed to open audio input stream.
    #[error("Failed to open audio input stream: {0}")]
    InputStreamError(String),

    /// Failed to open audio output stream.
    #[error("Failed to open audio output stream: {0}")]
    OutputStreamError(String),

    /// The dedicated audio thread exited or stopped answering.
    #[error("Audio thread is no longer running")]
    AudioThreadDied,

    /// Audio resampling error.
    #[error("Audio resampling failed: {0}")]
    ResampleError(String),

    /// An audio segment could not be decoded into samples.
    #[error("Failed to decode audio segment: {0}")]
    Decode(String),

    /// The remote voice session failed to open, send or stay connected.
    #[error("Voice transport error: {0}")]
    Transport(String),

    /// Configuration values out of range.
    #[error("Invalid audio configuration: {0}")]
    InvalidConfig(String),

    /// Operation requires a connected session.
    #[error("Voice session is not connected")]
    NotConnected,

    /// IO error (audio files, config files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Whether this error ends the session (as opposed to a dropped segment).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_) | Self::ResampleError(_))
    }
}
