//! One-shot narration playback over a hand-rendered output bus.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeBackend, OUTPUT_RATE, advance, pcm, secs};
use lectern_voice::config::frames_to_duration;
use lectern_voice::{
    EncodedSegment, LiveAudioConfig, Narration, NarrationEvent, OneShotPlayer, OutputBus,
    VoiceError,
};

fn player(backend: &Arc<FakeBackend>) -> OneShotPlayer {
    OneShotPlayer::new(LiveAudioConfig::default(), Arc::clone(backend) as _)
}

async fn drain(narration: &mut Narration) -> Vec<NarrationEvent> {
    let mut events = Vec::new();
    while let Some(event) = narration.next_event().await {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn reports_progress_until_the_clip_ends() {
    let backend = Arc::new(FakeBackend::default());
    let mut player = player(&backend);

    let mut narration = player
        .play(EncodedSegment::pcm16(pcm(secs(0.3), 8_000)))
        .await
        .unwrap();
    let duration = frames_to_duration(secs(0.3), OUTPUT_RATE);
    assert_eq!(narration.duration(), duration);

    assert_eq!(
        narration.next_event().await,
        Some(NarrationEvent::Progress(Duration::ZERO))
    );

    let bus = backend.last_bus();
    advance(&bus, secs(0.1));
    assert_eq!(
        narration.next_event().await,
        Some(NarrationEvent::Progress(frames_to_duration(secs(0.1), OUTPUT_RATE)))
    );

    advance(&bus, secs(0.2));
    let rest = drain(&mut narration).await;
    assert_eq!(
        rest,
        vec![NarrationEvent::Progress(duration), NarrationEvent::Ended]
    );
    assert!(narration.is_finished());
}

#[tokio::test(start_paused = true)]
async fn stop_silences_and_ends() {
    let backend = Arc::new(FakeBackend::default());
    let mut player = player(&backend);
    let mut narration = player
        .play(EncodedSegment::pcm16(pcm(secs(1.0), 8_000)))
        .await
        .unwrap();

    narration.stop();
    let events = drain(&mut narration).await;
    assert_eq!(events.last(), Some(&NarrationEvent::Ended));

    let bus = backend.last_bus();
    let mut quantum = [0.0_f32; 128];
    bus.render(&mut quantum);
    assert!(quantum.iter().all(|s| *s == 0.0));
    assert_eq!(bus.voice_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn playing_again_replaces_the_previous_clip() {
    let backend = Arc::new(FakeBackend::default());
    let mut player = player(&backend);

    let mut first = player
        .play(EncodedSegment::pcm16(pcm(secs(1.0), 8_000)))
        .await
        .unwrap();
    let mut second = player
        .play(EncodedSegment::pcm16(pcm(secs(1.0), 8_000)))
        .await
        .unwrap();

    assert_eq!(drain(&mut first).await.last(), Some(&NarrationEvent::Ended));
    assert_eq!(backend.opened(), 1);

    player.close().await;
    assert_eq!(drain(&mut second).await.last(), Some(&NarrationEvent::Ended));
    assert_eq!(backend.live_outputs(), 0);
}

#[tokio::test(start_paused = true)]
async fn undecodable_clip_is_rejected() {
    let backend = Arc::new(FakeBackend::default());
    let mut player = player(&backend);
    let err = player
        .play(EncodedSegment::pcm16(vec![0u8; 5]))
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::Decode(_)));
}

const CLIP_LEVEL: f32 = 8_000.0 / 32_768.0;

fn render_quantum(bus: &OutputBus) -> [f32; 128] {
    let mut quantum = [0.0_f32; 128];
    bus.render(&mut quantum);
    quantum
}

#[tokio::test(start_paused = true)]
async fn replaced_clip_is_silent_in_the_very_next_quantum() {
    let backend = Arc::new(FakeBackend::default());
    let mut player = player(&backend);

    let _first = player
        .play(EncodedSegment::pcm16(pcm(secs(1.0), 8_000)))
        .await
        .unwrap();
    let _second = player
        .play(EncodedSegment::pcm16(pcm(secs(1.0), 8_000)))
        .await
        .unwrap();

    // No yield in between: the first clip's progress task has not run.
    let quantum = render_quantum(&backend.last_bus());
    assert!(quantum.iter().all(|s| (*s - CLIP_LEVEL).abs() < 1e-6));
}

#[tokio::test(start_paused = true)]
async fn stop_takes_effect_without_waiting_for_the_progress_task() {
    let backend = Arc::new(FakeBackend::default());
    let mut player = player(&backend);
    let narration = player
        .play(EncodedSegment::pcm16(pcm(secs(1.0), 8_000)))
        .await
        .unwrap();

    narration.stop();
    assert!(narration.is_finished());
    let quantum = render_quantum(&backend.last_bus());
    assert!(quantum.iter().all(|s| *s == 0.0));
}

#[tokio::test(start_paused = true)]
async fn pause_holds_output_and_progress() {
    let backend = Arc::new(FakeBackend::default());
    let mut player = player(&backend);
    let mut narration = player
        .play(EncodedSegment::pcm16(pcm(secs(1.0), 8_000)))
        .await
        .unwrap();
    assert_eq!(
        narration.next_event().await,
        Some(NarrationEvent::Progress(Duration::ZERO))
    );

    let bus = backend.last_bus();
    advance(&bus, secs(0.1));
    narration.pause();
    assert!(narration.is_paused());

    let quantum = render_quantum(&bus);
    assert!(quantum.iter().all(|s| *s == 0.0));
    advance(&bus, secs(0.2));

    let held = frames_to_duration(secs(0.1), OUTPUT_RATE);
    assert_eq!(narration.next_event().await, Some(NarrationEvent::Progress(held)));
    assert_eq!(narration.next_event().await, Some(NarrationEvent::Progress(held)));

    narration.resume();
    let quantum = render_quantum(&bus);
    assert!(quantum.iter().all(|s| (*s - CLIP_LEVEL).abs() < 1e-6));
    assert_eq!(
        narration.next_event().await,
        Some(NarrationEvent::Progress(frames_to_duration(
            secs(0.1) + 128,
            OUTPUT_RATE
        )))
    );
    assert!(!narration.is_finished());
}

#[tokio::test(start_paused = true)]
async fn volume_scales_the_output() {
    let backend = Arc::new(FakeBackend::default());
    let mut player = player(&backend);
    player.set_volume(0.5);

    let _narration = player
        .play(EncodedSegment::pcm16(pcm(secs(1.0), 8_000)))
        .await
        .unwrap();
    let bus = backend.last_bus();
    let quantum = render_quantum(&bus);
    assert!(quantum.iter().all(|s| (*s - CLIP_LEVEL * 0.5).abs() < 1e-6));

    player.set_volume(0.25);
    assert!((player.volume() - 0.25).abs() < f32::EPSILON);
    let quantum = render_quantum(&bus);
    assert!(quantum.iter().all(|s| (*s - CLIP_LEVEL * 0.25).abs() < 1e-6));
}
