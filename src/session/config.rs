use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::gate::DEFAULT_NOISE_GATE_THRESHOLD;
use super::policy::ErrorPolicy;
use crate::audio::AudioBackendConfig;
use crate::live::SessionSetup;

pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_VOICE: &str = "Zephyr";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are a friendly, helpful voice assistant. Keep your answers brief and conversational.";

/// Configuration for a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model resource name, e.g. "models/gemini-2.5-flash-native-audio-preview-09-2025"
    pub model: String,

    /// Prebuilt voice for replies
    pub voice: String,

    /// System instruction sent at session open
    pub system_instruction: String,

    /// Frames at or above this RMS are sent upstream
    pub noise_gate_threshold: f32,

    /// How long to wait for the connection and `setupComplete`
    pub connect_timeout: Duration,

    /// Capture/playback rates and frame size
    #[serde(skip)]
    pub audio: AudioBackendConfig,

    /// Error classification and user-facing messages
    pub errors: ErrorPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            noise_gate_threshold: DEFAULT_NOISE_GATE_THRESHOLD,
            connect_timeout: Duration::from_secs(10),
            audio: AudioBackendConfig::default(),
            errors: ErrorPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Session-open parameters: audio replies, both transcriptions on
    pub fn setup(&self) -> SessionSetup {
        SessionSetup {
            model: self.model.clone(),
            system_instruction: self.system_instruction.clone(),
            voice: self.voice.clone(),
            input_transcription: true,
            output_transcription: true,
        }
    }
}
