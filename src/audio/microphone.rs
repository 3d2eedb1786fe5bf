// Microphone backend using cpal
//
// cpal streams are not Send, so each capture owns a dedicated thread that
// builds the stream, reports readiness, and holds the stream until told to
// shut down. Dropping the stream drops the callback, which closes the frame
// channel.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioConfig, AudioFrame};
use super::frame::FrameAssembler;

/// Frames queued between the device callback and the pipeline
const FRAME_QUEUE_DEPTH: usize = 64;

/// Live capture thread and the signal that ends it
struct CaptureThread {
    shutdown: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Microphone capture backend
pub struct MicrophoneBackend {
    config: AudioConfig,
    frame_size: usize,
    device_name: Option<String>,
    capture: Option<CaptureThread>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioConfig, frame_size: usize, device_name: Option<String>) -> Self {
        Self {
            config,
            frame_size,
            device_name,
            capture: None,
        }
    }

    /// List the names of available input devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .filter_map(|d| d.name().ok())
            .collect();
        Ok(devices)
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capture.is_some() {
            bail!("Already capturing");
        }

        info!(
            "Requesting microphone ({}Hz, {} channel(s), echo_cancellation={}, noise_suppression={})",
            self.config.sample_rate,
            self.config.channel_count,
            self.config.echo_cancellation,
            self.config.noise_suppression
        );

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel();

        let config = self.config.clone();
        let frame_size = self.frame_size;
        let device_name = self.device_name.clone();

        let handle = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                capture_thread(config, frame_size, device_name, frame_tx, ready_tx, shutdown_rx)
            })
            .context("Failed to spawn capture thread")?;

        let ready = ready_rx
            .await
            .map_err(|_| anyhow!("Capture thread exited before opening the stream"));

        if let Err(e) = ready.and_then(|r| r) {
            if handle.join().is_err() {
                warn!("Capture thread panicked during setup");
            }
            return Err(e);
        }

        self.capture = Some(CaptureThread {
            shutdown: shutdown_tx,
            handle,
        });

        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(capture) = self.capture.take() else {
            return Ok(());
        };

        info!("Stopping microphone capture");

        // A closed channel means the thread already ended
        let _ = capture.shutdown.send(());

        tokio::task::spawn_blocking(move || capture.handle.join())
            .await
            .context("Failed to wait for capture thread")?
            .map_err(|_| anyhow!("Capture thread panicked"))?;

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn capture_thread(
    config: AudioConfig,
    frame_size: usize,
    device_name: Option<String>,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<()>>,
    shutdown_rx: std_mpsc::Receiver<()>,
) {
    let stream = match open_stream(&config, frame_size, device_name.as_deref(), frame_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if ready_tx.send(Ok(())).is_err() {
        // start() was cancelled while we were opening the device
        return;
    }

    // Blocks until stop() signals or the backend is dropped
    let _ = shutdown_rx.recv();

    if let Err(e) = stream.pause() {
        warn!("Failed to pause input stream: {}", e);
    }
    drop(stream);

    debug!("Capture thread finished");
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<Device> {
    match name {
        Some(wanted) => host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| anyhow!("Input device not found: {}", wanted)),
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available")),
    }
}

fn open_stream(
    config: &AudioConfig,
    frame_size: usize,
    device_name: Option<&str>,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<Stream> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;

    info!(
        "Using input device: {}",
        device.name().unwrap_or_else(|_| "<unknown>".to_string())
    );

    if config.echo_cancellation || config.noise_suppression {
        debug!("Echo cancellation / noise suppression are left to the host audio stack");
    }

    let (stream_config, sample_format) = negotiate_config(&device, config)?;

    let mut sink = FrameSink {
        assembler: FrameAssembler::new(frame_size, stream_config.channels)
            .with_resampling(stream_config.sample_rate.0, config.sample_rate),
        sample_rate: config.sample_rate,
        frame_tx,
    };

    let on_error = |err: cpal::StreamError| error!("Input stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| sink.push(data),
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let floats: Vec<f32> = data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                sink.push(&floats);
            },
            on_error,
            None,
        ),
        other => bail!("Unsupported input sample format: {:?}", other),
    }
    .context("Failed to build input stream")?;

    stream.play().context("Failed to start input stream")?;

    Ok(stream)
}

/// Pick the stream to open: the requested rate and channel count when the
/// device offers them, otherwise the device default
fn negotiate_config(device: &Device, wanted: &AudioConfig) -> Result<(StreamConfig, SampleFormat)> {
    let rate = SampleRate(wanted.sample_rate);

    let exact = match device.supported_input_configs() {
        Ok(mut ranges) => ranges.find(|range| {
            range.channels() == wanted.channel_count
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
                && is_supported_format(range.sample_format())
        }),
        Err(e) => {
            debug!("Could not list supported input configs: {}", e);
            None
        }
    };

    let supported = match exact {
        Some(range) => range.with_sample_rate(rate),
        None => {
            let fallback = device
                .default_input_config()
                .context("Failed to query default input config")?;
            info!(
                "Device has no {}Hz {}ch input, capturing at {}Hz {}ch and converting",
                wanted.sample_rate,
                wanted.channel_count,
                fallback.sample_rate().0,
                fallback.channels()
            );
            fallback
        }
    };

    Ok((supported.config(), supported.sample_format()))
}

fn is_supported_format(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16)
}

/// Callback-side state: frames device buffers and forwards them
struct FrameSink {
    assembler: FrameAssembler,
    sample_rate: u32,
    frame_tx: mpsc::Sender<AudioFrame>,
}

impl FrameSink {
    fn push(&mut self, data: &[f32]) {
        for samples in self.assembler.push(data) {
            let frame = AudioFrame {
                samples,
                sample_rate: self.sample_rate,
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
            };

            if let Err(e) = self.frame_tx.try_send(frame) {
                match e {
                    mpsc::error::TrySendError::Full(_) => warn!("Frame queue full, dropping frame"),
                    mpsc::error::TrySendError::Closed(_) => debug!("Frame receiver gone"),
                }
            }
        }
    }
}
