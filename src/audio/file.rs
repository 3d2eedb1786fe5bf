use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioConfig, AudioFrame};
use super::frame::FrameAssembler;

/// A decoded WAV file with samples normalized to [-1, 1]
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Replays a WAV file through the capture pipeline
///
/// Frame timestamps are derived from the sample position, so replay without
/// pacing produces the same chunk boundaries as a live capture would.
pub struct FileBackend {
    path: PathBuf,
    config: AudioConfig,
    frame_size: usize,
    realtime: bool,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: PathBuf, config: AudioConfig, frame_size: usize, realtime: bool) -> Self {
        Self {
            path,
            config,
            frame_size,
            realtime,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            bail!("Already capturing");
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .context("WAV loader task failed")??;

        let sample_rate = self.config.sample_rate;
        if audio.sample_rate != sample_rate {
            info!("Resampling {} from {}Hz to {}Hz", audio.path, audio.sample_rate, sample_rate);
        }

        let mut assembler = FrameAssembler::new(self.frame_size, audio.channels)
            .with_resampling(audio.sample_rate, sample_rate);
        let frames = assembler.push(&audio.samples);
        if assembler.pending() > 0 {
            debug!("Ignoring {} trailing samples shorter than a frame", assembler.pending());
        }

        let (tx, rx) = mpsc::channel(16);
        let frame_size = self.frame_size;
        let realtime = self.realtime;

        let task = tokio::spawn(async move {
            let started_ms = chrono::Utc::now().timestamp_millis();
            let started = tokio::time::Instant::now();
            let total = frames.len();

            for (index, samples) in frames.into_iter().enumerate() {
                // A frame is ready once its last sample has been "captured"
                let offset = frame_end_offset(index, frame_size, sample_rate);

                if realtime {
                    tokio::time::sleep_until(started + offset).await;
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    timestamp_ms: started_ms + offset.as_millis() as i64,
                };

                if tx.send(frame).await.is_err() {
                    debug!("Frame receiver dropped, ending replay");
                    return;
                }
            }

            info!("File replay finished ({} frames)", total);
        });

        self.task = Some(task);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Replay task failed: {}", e);
                }
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Time from replay start until frame `index` is complete
pub fn frame_end_offset(index: usize, frame_size: usize, sample_rate: u32) -> Duration {
    let samples = (index as u64 + 1) * frame_size as u64;
    Duration::from_micros(samples * 1_000_000 / u64::from(sample_rate.max(1)))
}
