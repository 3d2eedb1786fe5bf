pub mod audio;
pub mod clock;
pub mod config;
pub mod recording;
pub mod socket;

pub use audio::{
    AudioBackend, AudioBackendFactory, AudioConfig, AudioFile, AudioFrame, AudioSource,
    ChunkBatcher, ChunkConfig, ChunkMessage, FileBackend, FrameAssembler, MicrophoneBackend,
};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use recording::{AudioRecorder, RecorderError, RecorderStats};
pub use socket::{ConnectionManager, ConnectionState, Connector, SocketClient, Transport};
