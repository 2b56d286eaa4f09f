use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::AudioBackendConfig;
use crate::session::{
    ErrorPolicy, SessionConfig, DEFAULT_MODEL, DEFAULT_NOISE_GATE_THRESHOLD,
    DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VOICE,
};

/// Gemini Live WebSocket endpoint
pub const DEFAULT_LIVE_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Prefix for environment overrides, e.g. `LOQA_LIVE__LIVE__VOICE=Puck`
pub const ENV_PREFIX: &str = "LOQA_LIVE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveConfig,
    pub audio: AudioConfig,
    pub errors: ErrorPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-live".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub voice: String,
    pub system_instruction: String,
    pub connect_timeout_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_LIVE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub capture_frame_size: usize,
    pub noise_gate_threshold: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let backend = AudioBackendConfig::default();
        Self {
            input_sample_rate: backend.input_sample_rate,
            output_sample_rate: backend.output_sample_rate,
            capture_frame_size: backend.capture_frame_size,
            noise_gate_threshold: DEFAULT_NOISE_GATE_THRESHOLD,
        }
    }
}

impl Config {
    /// Load defaults, then `path` (if present), then `LOQA_LIVE__*` variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        let config: Self = settings.try_deserialize().context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.input_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            bail!("audio sample rates must be non-zero");
        }
        if self.audio.capture_frame_size == 0 {
            bail!("audio.capture_frame_size must be non-zero");
        }
        if !(0.0..=1.0).contains(&self.audio.noise_gate_threshold) {
            bail!("audio.noise_gate_threshold must be within [0, 1]");
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.live.model.clone(),
            voice: self.live.voice.clone(),
            system_instruction: self.live.system_instruction.clone(),
            noise_gate_threshold: self.audio.noise_gate_threshold,
            connect_timeout: Duration::from_secs(self.live.connect_timeout_secs),
            audio: AudioBackendConfig {
                input_sample_rate: self.audio.input_sample_rate,
                output_sample_rate: self.audio.output_sample_rate,
                capture_frame_size: self.audio.capture_frame_size,
            },
            errors: self.errors.clone(),
        }
    }
}
