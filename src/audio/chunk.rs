use serde_json::{json, Value};
use std::time::Duration;

use super::pcm;
use crate::socket::packet::attachment_placeholder;

/// Event name chunks are emitted under
pub const AUDIO_DATA_EVENT: &str = "audio_data";

/// Mode tag carried by every chunk
pub const CHUNK_MODE: &str = "both";

/// One batched window of audio, the unit sent over the connection
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMessage {
    /// Concatenated 16-bit samples
    pub buffer: Vec<i16>,
    /// Emit time in epoch milliseconds
    pub timestamp: i64,
    pub mode: String,
}

impl ChunkMessage {
    pub fn new(buffer: Vec<i16>, timestamp: i64) -> Self {
        Self {
            buffer,
            timestamp,
            mode: CHUNK_MODE.to_string(),
        }
    }

    /// Split into the JSON event data and its binary attachments
    ///
    /// The sample buffer travels as attachment 0; the JSON carries a
    /// placeholder in its place.
    pub fn to_payload(&self) -> (Value, Vec<Vec<u8>>) {
        let data = json!({
            "buffer": attachment_placeholder(0),
            "timestamp": self.timestamp,
            "mode": self.mode,
        });

        (data, vec![pcm::to_le_bytes(&self.buffer)])
    }
}

/// Accumulates converted frames and decides when a chunk is due
///
/// A chunk is emitted on the first push at least `interval` after the
/// previous emit (or after `started_at_ms` for the first one). The pushed
/// frame is part of the emitted chunk.
#[derive(Debug)]
pub struct ChunkBatcher {
    interval_ms: i64,
    last_emit_ms: i64,
    pending: Vec<Vec<i16>>,
}

impl ChunkBatcher {
    pub fn new(interval: Duration, started_at_ms: i64) -> Self {
        Self {
            interval_ms: i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
            last_emit_ms: started_at_ms,
            pending: Vec::new(),
        }
    }

    /// Buffer one converted frame captured at `now_ms`
    pub fn push(&mut self, samples: Vec<i16>, now_ms: i64) -> Option<ChunkMessage> {
        self.pending.push(samples);

        if now_ms.saturating_sub(self.last_emit_ms) < self.interval_ms {
            return None;
        }

        let buffer = pcm::concat(&self.pending);
        self.pending.clear();
        self.last_emit_ms = now_ms;

        Some(ChunkMessage::new(buffer, now_ms))
    }

    pub fn buffered_frames(&self) -> usize {
        self.pending.len()
    }

    pub fn buffered_samples(&self) -> usize {
        self.pending.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn last_emit_ms(&self) -> i64 {
        self.last_emit_ms
    }
}
