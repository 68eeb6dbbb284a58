//! Main CLI parser and top-level argument handling.
//!
//! This module defines the root CLI structure with global options. Audio
//! overrides fall back to `LECTERN_*` environment variables.

use std::path::PathBuf;

use clap::{Args, Parser};

use crate::commands::Commands;

/// Command-line interface for the lectern voice tools.
#[derive(Parser)]
#[command(name = "lectern")]
#[command(about = "Voice companion audio tools")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Load audio settings from a JSON file
    #[arg(long = "config", env = "LECTERN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub audio: AudioArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Per-invocation overrides applied on top of the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct AudioArgs {
    /// Playback sample rate in Hz
    #[arg(long = "output-rate", env = "LECTERN_OUTPUT_RATE", global = true)]
    pub output_rate: Option<u32>,

    /// Capture sample rate in Hz
    #[arg(long = "input-rate", env = "LECTERN_INPUT_RATE", global = true)]
    pub input_rate: Option<u32>,

    /// Samples per uplink frame (power of two)
    #[arg(long = "frame-size", env = "LECTERN_FRAME_SIZE", global = true)]
    pub frame_size: Option<usize>,

    /// Linear output gain
    #[arg(long = "gain", env = "LECTERN_GAIN", global = true)]
    pub gain: Option<f32>,
}
