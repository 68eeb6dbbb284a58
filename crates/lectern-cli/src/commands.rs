//! Subcommand definitions.

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List audio input and output devices
    Devices,

    /// Play a narration clip (PCM16 LE mono at the output rate, or WAV)
    Play {
        /// Path to the audio clip
        file: PathBuf,

        /// Clip encoding (detected from the file header when omitted)
        #[arg(long, value_enum)]
        format: Option<ClipFormat>,
    },

    /// Print the effective configuration as JSON
    Config,
}

/// Encoding of a clip passed to `play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClipFormat {
    /// Raw signed 16-bit little-endian PCM
    Pcm,

    /// RIFF/WAV container
    Wav,
}
