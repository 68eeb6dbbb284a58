//! Composition of the effective configuration and logging.
//!
//! Precedence, lowest to highest: built-in defaults, the `--config` JSON
//! file, `LECTERN_*` environment variables, command-line flags (clap merges
//! the last two).

use std::path::Path;

use lectern_voice::{LiveAudioConfig, SessionConfig};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::CliError;
use crate::parser::{AudioArgs, Cli};

/// Resolved configuration for one invocation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Capture, playback and monitoring settings.
    pub audio: LiveAudioConfig,

    /// Remote session parameters.
    pub session: SessionConfig,
}

impl CliConfig {
    /// Build the configuration from parsed arguments.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let audio = match &cli.config {
            Some(path) => load_audio_config(path)?,
            None => LiveAudioConfig::default(),
        };
        Self::with_overrides(audio, &cli.audio)
    }

    /// Apply flag/env overrides to `audio` and validate the result.
    pub fn with_overrides(mut audio: LiveAudioConfig, args: &AudioArgs) -> Result<Self, CliError> {
        if let Some(rate) = args.output_rate {
            audio.output_sample_rate = rate;
        }
        if let Some(rate) = args.input_rate {
            audio.input_sample_rate = rate;
        }
        if let Some(size) = args.frame_size {
            audio.frame_size = size;
        }
        if let Some(gain) = args.gain {
            audio.output_gain = gain;
        }
        audio.validate()?;

        let session = SessionConfig {
            input_mime_type: audio.input_mime_type(),
            ..SessionConfig::default()
        };
        Ok(Self { audio, session })
    }
}

/// Read a JSON `LiveAudioConfig`. Missing fields take their defaults.
pub fn load_audio_config(path: &Path) -> Result<LiveAudioConfig, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| CliError::Config(format!("{}: {e}", path.display())))
}

/// Install the global subscriber: `RUST_LOG` when set, otherwise `warn`
/// (`debug` with `--verbose`). Logs go to stderr so they never mix with
/// command output.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .ok(); // Ignore error if already initialized
}
