// Tests for time-based batching of converted frames
//
// These tests verify that frames accumulate until the emit interval has
// elapsed and that each emitted chunk carries everything buffered so far.

use serde_json::json;
use std::time::Duration;
use voice_relay::audio::pcm;
use voice_relay::audio::{ChunkBatcher, ChunkMessage, CHUNK_MODE};

fn frame(value: i16) -> Vec<i16> {
    vec![value; 4096]
}

#[test]
fn test_no_emit_before_interval() {
    let mut batcher = ChunkBatcher::new(Duration::from_millis(5000), 0);

    assert!(batcher.push(frame(1), 0).is_none());
    assert!(batcher.push(frame(2), 2000).is_none());
    assert!(batcher.push(frame(3), 4999).is_none());

    assert_eq!(batcher.buffered_frames(), 3);
    assert_eq!(batcher.buffered_samples(), 3 * 4096);
}

#[test]
fn test_emit_includes_triggering_frame_and_resets() {
    let mut batcher = ChunkBatcher::new(Duration::from_millis(5000), 0);

    batcher.push(frame(1), 0);
    batcher.push(frame(2), 2000);
    let chunk = batcher.push(frame(3), 5100).expect("chunk should be emitted at 5100ms");

    let expected = pcm::concat(&[frame(1), frame(2), frame(3)]);
    assert_eq!(chunk.buffer, expected);
    assert_eq!(chunk.timestamp, 5100);
    assert_eq!(chunk.mode, CHUNK_MODE);

    assert!(batcher.is_empty());
    assert_eq!(batcher.buffered_samples(), 0);
    assert_eq!(batcher.last_emit_ms(), 5100);
}

#[test]
fn test_emit_exactly_at_interval() {
    let mut batcher = ChunkBatcher::new(Duration::from_millis(5000), 1_000);

    assert!(batcher.push(frame(1), 5_999).is_none());
    assert!(batcher.push(frame(1), 6_000).is_some());
}

#[test]
fn test_interval_restarts_from_last_emit() {
    let mut batcher = ChunkBatcher::new(Duration::from_millis(5000), 0);

    assert!(batcher.push(frame(1), 5000).is_some());
    assert!(batcher.push(frame(2), 9000).is_none());

    let chunk = batcher.push(frame(3), 10_000).expect("second chunk");
    assert_eq!(chunk.buffer, pcm::concat(&[frame(2), frame(3)]));
}

#[test]
fn test_chunk_payload_uses_binary_placeholder() {
    let chunk = ChunkMessage::new(vec![1, -2, 3], 1_700_000_000_000);

    let (data, attachments) = chunk.to_payload();

    assert_eq!(
        data,
        json!({
            "buffer": { "_placeholder": true, "num": 0 },
            "timestamp": 1_700_000_000_000i64,
            "mode": "both",
        })
    );
    assert_eq!(attachments.len(), 1);
    assert_eq!(pcm::from_le_bytes(&attachments[0]), vec![1, -2, 3]);
}
