use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics about a recorder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecorderStats {
    /// Whether recording is currently active
    pub is_recording: bool,

    /// When the current (or last) recording started
    pub started_at: Option<DateTime<Utc>>,

    /// Frames converted since the recorder was created
    pub frames_processed: usize,

    /// Chunks handed to the connection
    pub chunks_emitted: usize,

    /// Chunks lost because the connection refused them
    pub chunks_dropped: usize,

    /// Samples contained in emitted chunks
    pub samples_emitted: usize,
}

/// Counters shared with the frame-processing task
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub frames_processed: AtomicUsize,
    pub chunks_emitted: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub samples_emitted: AtomicUsize,
}

impl Counters {
    pub fn snapshot(&self, is_recording: bool, started_at: Option<DateTime<Utc>>) -> RecorderStats {
        RecorderStats {
            is_recording,
            started_at,
            frames_processed: self.frames_processed.load(Ordering::SeqCst),
            chunks_emitted: self.chunks_emitted.load(Ordering::SeqCst),
            chunks_dropped: self.chunks_dropped.load(Ordering::SeqCst),
            samples_emitted: self.samples_emitted.load(Ordering::SeqCst),
        }
    }
}
