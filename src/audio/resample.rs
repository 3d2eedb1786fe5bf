// Sample-rate conversion for capture devices that cannot open the configured rate
//
// Linear interpolation, carried across calls so that device callbacks of any
// size join without a seam.

/// Streaming linear resampler for mono audio
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Source samples advanced per output sample
    step: f64,
    /// Position of the next output sample, relative to `last`
    position: f64,
    /// Final sample of the previous call
    last: Option<f32>,
}

impl LinearResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            step: f64::from(source_rate.max(1)) / f64::from(target_rate.max(1)),
            position: 0.0,
            last: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    /// Resample the next block of the stream
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() || input.is_empty() {
            return input.to_vec();
        }

        // The window is `last` (when present) followed by `input`
        let offset = usize::from(self.last.is_some());
        let len = input.len() + offset;
        let last = self.last;
        let sample = |i: usize| match last {
            Some(prev) if i == 0 => prev,
            _ => input[i - offset],
        };

        let mut output = Vec::with_capacity((input.len() as f64 / self.step) as usize + 1);
        let end = (len - 1) as f64;

        while self.position < end {
            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            output.push(sample(index) * (1.0 - frac) + sample(index + 1) * frac);
            self.position += self.step;
        }

        self.position -= end;
        self.last = input.last().copied();

        output
    }
}
