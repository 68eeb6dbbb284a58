//! `lectern play`: one-shot narration with a progress bar.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use lectern_voice::{
    EncodedSegment, LiveAudioConfig, LocalAudioBackend, NarrationEvent, OneShotPlayer,
    SegmentEncoding,
};

use crate::commands::ClipFormat;

/// Play `file` to the default output device until it ends or Ctrl-C.
pub async fn execute(audio: LiveAudioConfig, file: &Path, format: Option<ClipFormat>) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let segment = segment_for(bytes, format);

    let mut player = OneShotPlayer::new(audio, Arc::new(LocalAudioBackend::new()));
    let mut narration = player.play(segment).await?;
    tracing::debug!(file = %file.display(), duration = ?narration.duration(), "Playing clip");

    let total = narration.duration();
    let bar = progress_bar(total)?;
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = narration.next_event() => match event {
                Some(NarrationEvent::Progress(position)) => {
                    bar.set_position(millis(position));
                    bar.set_message(format!("{} / {}", format_clock(position), format_clock(total)));
                }
                Some(NarrationEvent::Ended) | None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                narration.stop();
            }
        }
    }

    if interrupted {
        bar.abandon_with_message("stopped");
    } else {
        bar.finish();
    }
    player.close().await;
    Ok(())
}

fn segment_for(bytes: Vec<u8>, format: Option<ClipFormat>) -> EncodedSegment {
    match format {
        Some(ClipFormat::Pcm) => EncodedSegment::pcm16(bytes),
        Some(ClipFormat::Wav) => EncodedSegment {
            payload: bytes.into(),
            encoding: SegmentEncoding::Wav,
        },
        None => EncodedSegment::sniff(bytes),
    }
}

fn progress_bar(total: Duration) -> Result<ProgressBar> {
    let pb = ProgressBar::new(millis(total));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")?
            .progress_chars("█▓░"),
    );
    Ok(pb)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// `m:ss` rendering of a playback position.
fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}
