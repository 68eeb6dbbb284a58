//! CLI-specific error types and exit codes.

use lectern_voice::VoiceError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Audio pipeline error.
    #[error("{0}")]
    Voice(#[from] VoiceError),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CliError {
    /// Map error to an exit code (sysexits.h where one fits).
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Voice(VoiceError::MicrophonePermissionDenied) => 77, // EX_NOPERM
            Self::Voice(VoiceError::NoInputDevice | VoiceError::NoOutputDevice) => 69, // EX_UNAVAILABLE
            Self::Voice(VoiceError::InvalidConfig(_)) | Self::Config(_) => 78, // EX_CONFIG
            Self::Voice(VoiceError::Decode(_)) => 65, // EX_DATAERR
            Self::Voice(_) => 1,
            Self::Io(_) => 74, // EX_IOERR
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
