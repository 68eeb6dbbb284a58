//! Timeline behaviour of the playback scheduler over a real output bus.
//!
//! The bus clock only advances when a test renders, which makes every
//! start time exact.

mod common;

use std::sync::{Arc, Mutex};

use common::{advance, advance_to, bus, pcm, secs};
use lectern_voice::device::OutputDevice;
use lectern_voice::engine::PlaybackEngine;
use lectern_voice::scheduler::{BufferId, PlaybackScheduler, SchedulerState};
use lectern_voice::{EncodedSegment, PlaybackBuffer, SegmentDecoder};
use tokio_util::sync::CancellationToken;

fn clip(seconds: f64) -> PlaybackBuffer {
    #[allow(clippy::cast_possible_truncation)]
    let frames = secs(seconds) as usize;
    PlaybackBuffer::new(vec![0.25; frames], common::OUTPUT_RATE)
}

/// Scheduler whose end notifications are collected for the test to replay.
fn scheduler(output: Arc<dyn OutputDevice>) -> (PlaybackScheduler, Arc<Mutex<Vec<BufferId>>>) {
    let ended = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ended);
    let scheduler = PlaybackScheduler::new(
        output,
        Arc::new(move |id: BufferId| sink.lock().unwrap().push(id)),
    );
    (scheduler, ended)
}

fn drain_ended(scheduler: &mut PlaybackScheduler, ended: &Mutex<Vec<BufferId>>) {
    for id in ended.lock().unwrap().drain(..) {
        scheduler.finished(id);
    }
}

#[test]
fn three_segments_play_back_to_back() {
    let bus = bus();
    let (mut scheduler, _ended) = scheduler(bus.clone());

    let a = scheduler.schedule(&clip(1.0)).unwrap();
    let b = scheduler.schedule(&clip(0.5)).unwrap();
    let c = scheduler.schedule(&clip(2.0)).unwrap();

    assert_eq!(a.start_frame, 0);
    assert_eq!(b.start_frame, secs(1.0));
    assert_eq!(c.start_frame, secs(1.5));
    assert_eq!(scheduler.cursor(), secs(3.5));
    assert_eq!(scheduler.active().len(), 3);
}

#[test]
fn rendered_timeline_has_no_gap_or_overlap() {
    let bus = bus();
    let (mut scheduler, _ended) = scheduler(bus.clone());
    scheduler.schedule(&clip(0.01)).unwrap();
    scheduler.schedule(&clip(0.01)).unwrap();

    let mut out = vec![0.0; usize::try_from(secs(0.03)).unwrap()];
    bus.render(&mut out);

    let (played, rest) = out.split_at(usize::try_from(secs(0.02)).unwrap());
    assert!(played.iter().all(|s| (*s - 0.25).abs() < 1e-6));
    assert!(rest.iter().all(|s| *s == 0.0));
}

#[test]
fn interruption_silences_and_restarts_at_now() {
    let bus = bus();
    let (mut scheduler, ended) = scheduler(bus.clone());

    scheduler.schedule(&clip(1.0)).unwrap();
    scheduler.schedule(&clip(0.5)).unwrap();
    scheduler.schedule(&clip(2.0)).unwrap();

    advance_to(&bus, secs(1.2));
    drain_ended(&mut scheduler, &ended);
    assert_eq!(scheduler.active().len(), 2);

    assert_eq!(scheduler.interrupt(), 2);
    assert_eq!(scheduler.cursor(), 0);
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    // Within one render quantum nothing from before the interruption sounds.
    let mut quantum = [1.0_f32; 128];
    bus.render(&mut quantum);
    assert!(quantum.iter().all(|s| *s == 0.0));
    assert_eq!(bus.voice_count(), 0);

    advance_to(&bus, secs(1.3));
    let d = scheduler.schedule(&clip(0.5)).unwrap();
    assert_eq!(d.start_frame, secs(1.3));
    assert_eq!(scheduler.cursor(), secs(1.8));

    // Stopped buffers never report a natural end.
    advance_to(&bus, secs(4.0));
    assert_eq!(*ended.lock().unwrap(), vec![d.id]);
}

#[test]
fn late_arrival_starts_immediately() {
    let bus = bus();
    let (mut scheduler, ended) = scheduler(bus.clone());

    let first = scheduler.schedule(&clip(0.5)).unwrap();
    advance_to(&bus, secs(1.0));
    drain_ended(&mut scheduler, &ended);
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    let late = scheduler.schedule(&clip(0.25)).unwrap();
    assert_eq!(late.start_frame, secs(1.0));
    assert_eq!(late.gap_frames, secs(1.0) - first.end_frame());
    assert_eq!(scheduler.cursor(), secs(1.25));
}

#[test]
fn natural_end_empties_the_active_set() {
    let bus = bus();
    let (mut scheduler, ended) = scheduler(bus.clone());
    let a = scheduler.schedule(&clip(0.1)).unwrap();

    advance(&bus, secs(0.05));
    assert!(ended.lock().unwrap().is_empty());

    advance(&bus, secs(0.05));
    assert_eq!(*ended.lock().unwrap(), vec![a.id]);
    drain_ended(&mut scheduler, &ended);
    assert!(scheduler.active().is_empty());
}

#[test]
fn decoded_segments_keep_their_own_length() {
    let decoder = SegmentDecoder::new(common::OUTPUT_RATE, 1);
    let a = decoder.decode(&EncodedSegment::pcm16(pcm(secs(0.2), 1000))).unwrap();
    let b = decoder.decode(&EncodedSegment::pcm16(pcm(secs(0.3), 1000))).unwrap();

    let bus = bus();
    let (mut scheduler, _ended) = scheduler(bus.clone());
    scheduler.schedule(&a).unwrap();
    let second = scheduler.schedule(&b).unwrap();
    assert_eq!(second.start_frame, secs(0.2));
    assert_eq!(second.frames, secs(0.3));
}

#[tokio::test]
async fn corrupt_segment_is_dropped_without_moving_the_cursor() {
    let bus = bus();
    let cancel = CancellationToken::new();
    let (engine, task) = PlaybackEngine::spawn(bus.clone(), cancel.clone());

    engine.enqueue(EncodedSegment::pcm16(pcm(secs(0.5), 500)));
    engine.enqueue(EncodedSegment::pcm16(vec![1, 2, 3]));
    engine.enqueue(EncodedSegment::base64("***not base64***"));
    engine.enqueue(EncodedSegment::pcm16(pcm(secs(0.25), 500)));

    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.scheduled, 2);
    assert_eq!(snapshot.dropped, 2);
    assert_eq!(snapshot.cursor, secs(0.75));
    assert_eq!(snapshot.active, 2);

    cancel.cancel();
    task.await.unwrap();
    assert!(engine.snapshot().await.is_none());
}

#[tokio::test]
async fn engine_applies_interrupt_in_arrival_order() {
    let bus = bus();
    let cancel = CancellationToken::new();
    let (engine, task) = PlaybackEngine::spawn(bus.clone(), cancel.clone());

    engine.enqueue(EncodedSegment::pcm16(pcm(secs(1.0), 500)));
    engine.interrupt();
    engine.enqueue(EncodedSegment::pcm16(pcm(secs(0.5), 500)));

    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.interruptions, 1);
    assert_eq!(snapshot.active, 1);
    assert_eq!(snapshot.cursor, secs(0.5));

    engine.shutdown();
    task.await.unwrap();
    assert_eq!(bus.voice_count(), 1);
    let mut quantum = [0.0_f32; 128];
    bus.render(&mut quantum);
    assert_eq!(bus.voice_count(), 0);
}

#[tokio::test]
async fn end_notifications_return_the_engine_to_idle() {
    let bus = bus();
    let cancel = CancellationToken::new();
    let (engine, _task) = PlaybackEngine::spawn(bus.clone(), cancel.clone());

    engine.enqueue(EncodedSegment::pcm16(pcm(secs(0.1), 500)));
    assert_eq!(engine.snapshot().await.unwrap().state, SchedulerState::Scheduled);

    advance(&bus, secs(0.2));
    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SchedulerState::Idle);
    assert_eq!(snapshot.active, 0);
    cancel.cancel();
}

/// Clip lengths and the clock advance before each admission; every delay
/// stays below the length of the clip admitted just before it.
const JITTERED: [(f64, f64); 4] = [(0.4, 0.0), (0.25, 0.1), (0.6, 0.2), (0.3, 0.5)];

#[test]
fn arrival_jitter_within_buffered_audio_keeps_segments_contiguous() {
    let bus = bus();
    let (mut scheduler, ended) = scheduler(bus.clone());

    let mut expected_start = 0;
    for (length, delay) in JITTERED {
        advance(&bus, secs(delay));
        drain_ended(&mut scheduler, &ended);

        let placed = scheduler.schedule(&clip(length)).unwrap();
        assert_eq!(placed.start_frame, expected_start);
        assert_eq!(placed.gap_frames, 0);
        assert!(placed.start_frame >= bus.now());
        expected_start = placed.end_frame();
    }
    assert_eq!(scheduler.cursor(), secs(1.55));
}

#[tokio::test]
async fn engine_keeps_jittered_segments_contiguous() {
    let bus = bus();
    let cancel = CancellationToken::new();
    let (engine, task) = PlaybackEngine::spawn(bus.clone(), cancel.clone());

    let mut expected_cursor = 0;
    for (length, delay) in JITTERED {
        advance(&bus, secs(delay));
        engine.enqueue(EncodedSegment::pcm16(pcm(secs(length), 500)));
        expected_cursor += secs(length);

        let snapshot = engine.snapshot().await.unwrap();
        assert_eq!(snapshot.cursor, expected_cursor);
        assert_eq!(snapshot.dropped, 0);
    }

    cancel.cancel();
    task.await.unwrap();
}
