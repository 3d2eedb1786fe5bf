use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// One fixed-size block of captured samples, as delivered to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Floating-point samples in [-1, 1] (first channel only)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Wall-clock time the frame became ready, in epoch milliseconds
    pub timestamp_ms: i64,
}

/// Capture constraints requested from the audio device
///
/// Set once when a backend is constructed and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub channel_count: u16,
    pub sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            channel_count: 1,
            sample_rate: 44100,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Framing and batching parameters for the capture pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Samples per processing callback
    pub frame_size: usize,
    /// Minimum time between two emitted chunks
    pub emit_interval_ms: u64,
}

impl ChunkConfig {
    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms)
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            frame_size: 4096,
            emit_interval_ms: 5000,
        }
    }
}

/// Audio capture backend trait
///
/// A backend owns everything acquired for one capture (device stream,
/// worker thread, replay task). It can be started again after `stop`.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Acquire the capture source and start delivering frames
    ///
    /// The returned channel closes once the backend is stopped.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Release everything acquired by `start`; a no-op when idle
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Where captured audio comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default (or named) input device
    Microphone { device: Option<String> },
    /// WAV file replay, optionally paced in real time
    File { path: PathBuf, realtime: bool },
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    pub fn create(
        source: AudioSource,
        config: AudioConfig,
        chunk: &ChunkConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone { device } => Ok(Box::new(
                super::microphone::MicrophoneBackend::new(config, chunk.frame_size, device),
            )),
            AudioSource::File { path, realtime } => Ok(Box::new(
                super::file::FileBackend::new(path, config, chunk.frame_size, realtime),
            )),
        }
    }
}
