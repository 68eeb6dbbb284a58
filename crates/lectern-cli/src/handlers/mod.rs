//! Command handlers.
//!
//! Each handler is a thin wrapper: it resolves CLI input, calls into
//! `lectern-voice`, and formats output for the terminal.

pub mod config;
pub mod devices;
pub mod play;
