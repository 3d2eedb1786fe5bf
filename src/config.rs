use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{AudioConfig, ChunkConfig};

/// Default relay server address
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Prefix for environment overrides, e.g. `VOICE_RELAY__SERVER__URL`
pub const ENV_PREFIX: &str = "VOICE_RELAY";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub chunk: ChunkConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub url: String,
}

impl Config {
    /// Load configuration from built-in defaults, an optional file at `path`
    /// (extension may be omitted), and `VOICE_RELAY__*` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = Self::builder()?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let audio = AudioConfig::default();
        let chunk = ChunkConfig::default();

        let builder = config::Config::builder()
            .set_default("server.url", DEFAULT_SERVER_URL)?
            .set_default("audio.channel_count", i64::from(audio.channel_count))?
            .set_default("audio.sample_rate", i64::from(audio.sample_rate))?
            .set_default("audio.echo_cancellation", audio.echo_cancellation)?
            .set_default("audio.noise_suppression", audio.noise_suppression)?
            .set_default("chunk.frame_size", chunk.frame_size as i64)?
            .set_default("chunk.emit_interval_ms", chunk.emit_interval_ms as i64)?;

        Ok(builder)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                url: DEFAULT_SERVER_URL.to_string(),
            },
            audio: AudioConfig::default(),
            chunk: ChunkConfig::default(),
        }
    }
}
