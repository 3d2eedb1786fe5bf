pub mod backend;
pub mod chunk;
pub mod file;
pub mod frame;
pub mod microphone;
pub mod pcm;
pub mod resample;

pub use backend::{AudioBackend, AudioBackendFactory, AudioConfig, AudioFrame, AudioSource, ChunkConfig};
pub use chunk::{ChunkBatcher, ChunkMessage, AUDIO_DATA_EVENT, CHUNK_MODE};
pub use file::{AudioFile, FileBackend};
pub use frame::FrameAssembler;
pub use microphone::MicrophoneBackend;
pub use resample::LinearResampler;
