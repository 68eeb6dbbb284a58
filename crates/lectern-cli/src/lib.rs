//! Command-line front end for lectern's audio pipeline.
//!
//! Lists audio devices, prints the effective audio configuration and plays
//! one-shot narration clips through the same scheduler the live session
//! uses.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio_test as _;

// Used by the binary entry point
use dotenvy as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;

// Re-export primary types for convenient access
pub use bootstrap::{CliConfig, init_tracing};
pub use commands::{ClipFormat, Commands};
pub use error::CliError;
pub use parser::Cli;
