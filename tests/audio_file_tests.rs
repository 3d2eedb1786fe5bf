// Integration tests for WAV loading and file replay
//
// These tests write small WAV fixtures to a temporary directory and read them
// back through the file backend.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use voice_relay::audio::file::frame_end_offset;
use voice_relay::audio::{AudioBackend, AudioConfig, AudioFile, FileBackend};

fn write_wav(dir: &Path, name: &str, channels: u16, sample_rate: u32, samples: &[i16]) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_wav(temp_dir.path(), "tone.wav", 1, 44100, &vec![16384i16; 44100])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 44100);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 44100);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);
    assert!((audio.samples[0] - 0.5).abs() < 1e-6, "16384 / 32768 = 0.5");
    assert!(audio.path.contains("tone.wav"));

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");

    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_frame_end_offset() {
    // 4096 samples at 44.1kHz ~ 92.88ms per frame
    assert_eq!(frame_end_offset(0, 4096, 44100).as_millis(), 92);
    assert_eq!(frame_end_offset(53, 4096, 44100).as_millis(), 5015);
}

#[tokio::test]
async fn test_file_backend_replays_fixed_size_frames() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // 2.5 frames of audio: the trailing half frame is not delivered
    let samples: Vec<i16> = (0..10240).map(|i| (i % 100) as i16).collect();
    let path = write_wav(temp_dir.path(), "ramp.wav", 1, 44100, &samples)?;

    let mut backend = FileBackend::new(path, AudioConfig::default(), 4096, false);
    let mut frames = backend.start().await?;
    assert!(backend.is_capturing());

    let first = frames.recv().await.expect("first frame");
    let second = frames.recv().await.expect("second frame");
    assert!(frames.recv().await.is_none(), "Replay should end after two frames");

    assert_eq!(first.samples.len(), 4096);
    assert_eq!(second.samples.len(), 4096);
    assert_eq!(first.sample_rate, 44100);
    // Frame ends at 92ms and 185ms after replay start
    assert_eq!(second.timestamp_ms - first.timestamp_ms, 93);
    assert!((first.samples[1] - 1.0 / 32768.0).abs() < 1e-9);

    backend.stop().await?;
    assert!(!backend.is_capturing());

    Ok(())
}

#[tokio::test]
async fn test_file_backend_keeps_first_channel_of_stereo() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // Left channel positive, right channel negative
    let samples: Vec<i16> = (0..8).flat_map(|_| [8192i16, -8192i16]).collect();
    let path = write_wav(temp_dir.path(), "stereo.wav", 2, 44100, &samples)?;

    let mut backend = FileBackend::new(path, AudioConfig::default(), 8, false);
    let mut frames = backend.start().await?;

    let frame = frames.recv().await.expect("one frame");
    assert!(frame.samples.iter().all(|&s| (s - 0.25).abs() < 1e-6));

    backend.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_file_backend_missing_file_fails_on_start() {
    let mut backend = FileBackend::new(
        PathBuf::from("/nonexistent/audio.wav"),
        AudioConfig::default(),
        4096,
        false,
    );

    assert!(backend.start().await.is_err());
    assert!(!backend.is_capturing());
}

#[tokio::test]
async fn test_file_backend_resamples_to_configured_rate() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // One 4096-sample frame worth of 22.05kHz audio doubles at 44.1kHz
    let path = write_wav(temp_dir.path(), "narrow.wav", 1, 22050, &vec![8192i16; 4096])?;

    let mut backend = FileBackend::new(path, AudioConfig::default(), 4096, false);
    let mut frames = backend.start().await?;

    let frame = frames.recv().await.expect("one frame");
    assert_eq!(frame.sample_rate, 44100);
    assert_eq!(frame.samples.len(), 4096);
    assert!(frame.samples.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    // 8190 resampled samples: the second frame is incomplete
    assert!(frames.recv().await.is_none());

    backend.stop().await?;
    Ok(())
}
