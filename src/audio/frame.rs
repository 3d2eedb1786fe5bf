// Fixed-size framing for device callbacks
//
// Capture devices deliver interleaved buffers of whatever size and rate the
// host picks. The pipeline works on fixed blocks of `frame_size` samples taken
// from the first channel at the configured rate, so callbacks are re-cut here.

use super::resample::LinearResampler;

/// Re-cuts interleaved audio into fixed-size mono frames
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    channels: usize,
    resampler: Option<LinearResampler>,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, channels: u16) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            channels: usize::from(channels.max(1)),
            resampler: None,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Convert from `source_rate` to `target_rate` before framing
    pub fn with_resampling(mut self, source_rate: u32, target_rate: u32) -> Self {
        let resampler = LinearResampler::new(source_rate, target_rate);
        self.resampler = (!resampler.is_passthrough()).then_some(resampler);
        self
    }

    /// Feed interleaved samples, returning every frame completed by them
    pub fn push(&mut self, interleaved: &[f32]) -> Vec<Vec<f32>> {
        let mono: Vec<f32> = interleaved.iter().step_by(self.channels).copied().collect();
        let mono = match self.resampler.as_mut() {
            Some(resampler) => resampler.process(&mono),
            None => mono,
        };

        let mut frames = Vec::new();

        for sample in mono {
            self.pending.push(sample);

            if self.pending.len() == self.frame_size {
                let frame = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                frames.push(frame);
            }
        }

        frames
    }

    /// Number of samples waiting for the next frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}
