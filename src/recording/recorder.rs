use chrono::{DateTime, Utc};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::stats::{Counters, RecorderStats};
use crate::audio::{pcm, AudioBackend, AudioFrame, ChunkBatcher, ChunkConfig, AUDIO_DATA_EVENT};
use crate::clock::{Clock, SystemClock};
use crate::socket::Transport;

/// How long `stop` waits for queued frames to drain
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum RecorderError {
    /// Capture setup failed; the cause is logged, not returned
    #[error("failed to initialize audio recording")]
    Initialization,

    #[error("recording already in progress")]
    AlreadyRecording,
}

enum RecorderState {
    Idle,
    Recording {
        task: JoinHandle<()>,
        started_at: DateTime<Utc>,
        /// Flips to true once the source has delivered its last frame
        finished: watch::Receiver<bool>,
    },
}

/// Captures audio, converts it to 16-bit PCM and emits 5-second chunks
///
/// The recorder is an explicit two-state machine: `start` moves Idle to
/// Recording and is rejected while Recording; `stop` returns to Idle and is a
/// no-op when already idle.
pub struct AudioRecorder {
    backend: Box<dyn AudioBackend>,
    transport: Arc<dyn Transport>,
    chunk_config: ChunkConfig,
    clock: Arc<dyn Clock>,
    state: RecorderState,
    last_started_at: Option<DateTime<Utc>>,
    counters: Arc<Counters>,
}

impl AudioRecorder {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        transport: Arc<dyn Transport>,
        chunk_config: ChunkConfig,
    ) -> Self {
        Self::with_clock(backend, transport, chunk_config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Box<dyn AudioBackend>,
        transport: Arc<dyn Transport>,
        chunk_config: ChunkConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            transport,
            chunk_config,
            clock,
            state: RecorderState::Idle,
            last_started_at: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Acquire the capture source and start emitting chunks
    pub async fn start(&mut self) -> Result<(), RecorderError> {
        if self.is_recording() {
            warn!("Recording already started");
            return Err(RecorderError::AlreadyRecording);
        }

        info!("Starting audio recording ({} backend)", self.backend.name());

        let frames = match self.backend.start().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Audio recording error: {:#}", e);
                // Release anything acquired before the failure
                if let Err(e) = self.backend.stop().await {
                    warn!("Failed to release audio backend: {:#}", e);
                }
                return Err(RecorderError::Initialization);
            }
        };

        let batcher = ChunkBatcher::new(self.chunk_config.emit_interval(), self.clock.now_ms());
        let (finished_tx, finished) = watch::channel(false);
        let task = tokio::spawn(process_frames(
            frames,
            batcher,
            Arc::clone(&self.transport),
            Arc::clone(&self.counters),
            finished_tx,
        ));

        let started_at = Utc::now();
        self.last_started_at = Some(started_at);
        self.state = RecorderState::Recording {
            task,
            started_at,
            finished,
        };

        info!("Audio recording started");
        Ok(())
    }

    /// Release the capture source and return to Idle
    ///
    /// Never fails; release errors are logged. Samples buffered since the
    /// last emitted chunk are discarded.
    pub async fn stop(&mut self) -> RecorderStats {
        let RecorderState::Recording { mut task, .. } =
            std::mem::replace(&mut self.state, RecorderState::Idle)
        else {
            debug!("Recorder already idle");
            return self.stats();
        };

        info!("Stopping audio recording");

        if let Err(e) = self.backend.stop().await {
            warn!("Failed to release audio backend: {:#}", e);
        }

        match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Frame processing task panicked: {}", e),
            Err(_) => {
                warn!("Frame processing did not finish within {:?}, aborting", DRAIN_TIMEOUT);
                task.abort();
            }
        }

        let stats = self.stats();
        info!(
            "Audio recording stopped ({} chunks emitted, {} dropped)",
            stats.chunks_emitted, stats.chunks_dropped
        );
        stats
    }

    /// Resolves once the capture source runs dry, such as a replayed file
    /// reaching its end. Resolves immediately when idle.
    ///
    /// The recorder stays in Recording until `stop` is called.
    pub async fn finished(&self) {
        let RecorderState::Recording { finished, .. } = &self.state else {
            return;
        };

        let mut finished = finished.clone();
        // A dropped sender means the task is gone, which also counts
        let _ = finished.wait_for(|done| *done).await;
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    /// Whether the backend currently holds capture resources
    pub fn is_capturing(&self) -> bool {
        self.backend.is_capturing()
    }

    pub fn stats(&self) -> RecorderStats {
        let started_at = match &self.state {
            RecorderState::Recording { started_at, .. } => Some(*started_at),
            RecorderState::Idle => self.last_started_at,
        };
        self.counters.snapshot(self.is_recording(), started_at)
    }
}

async fn process_frames(
    mut frames: mpsc::Receiver<AudioFrame>,
    mut batcher: ChunkBatcher,
    transport: Arc<dyn Transport>,
    counters: Arc<Counters>,
    finished: watch::Sender<bool>,
) {
    debug!("Frame processing task started");

    while let Some(frame) = frames.recv().await {
        let samples = pcm::float_to_i16(&frame.samples);
        counters.frames_processed.fetch_add(1, Ordering::SeqCst);

        let Some(chunk) = batcher.push(samples, frame.timestamp_ms) else {
            continue;
        };

        let sample_count = chunk.buffer.len();
        let (data, attachments) = chunk.to_payload();

        match transport.emit(AUDIO_DATA_EVENT, data, attachments) {
            Ok(()) => {
                counters.chunks_emitted.fetch_add(1, Ordering::SeqCst);
                counters.samples_emitted.fetch_add(sample_count, Ordering::SeqCst);
                debug!("Emitted chunk ({} samples, t={})", sample_count, chunk.timestamp);
            }
            Err(e) => {
                counters.chunks_dropped.fetch_add(1, Ordering::SeqCst);
                warn!("Dropping chunk of {} samples: {}", sample_count, e);
            }
        }
    }

    if !batcher.is_empty() {
        debug!(
            "Discarding {} buffered samples from an incomplete chunk",
            batcher.buffered_samples()
        );
    }

    finished.send_replace(true);
    debug!("Frame processing task stopped");
}
