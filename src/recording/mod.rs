pub mod recorder;
pub mod stats;

pub use recorder::{AudioRecorder, RecorderError};
pub use stats::RecorderStats;
