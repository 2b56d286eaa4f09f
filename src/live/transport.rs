use tokio::sync::mpsc;

use super::messages::{
    AudioTranscriptionConfig, Blob, ClientMessage, Content, GenerationConfig, PrebuiltVoiceConfig,
    RealtimeInput, ServerContent, Setup, SpeechConfig, VoiceConfig,
};
use crate::error::LiveResult;

/// MIME type of outbound microphone audio
pub const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// Parameters fixed when a session is opened
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSetup {
    pub model: String,
    pub system_instruction: String,
    pub voice: String,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

impl SessionSetup {
    /// Build the `setup` frame: audio-only responses with the configured voice
    pub fn to_message(&self) -> ClientMessage {
        ClientMessage::Setup(Setup {
            model: self.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice.clone(),
                        },
                    },
                },
            },
            system_instruction: Content::text(self.system_instruction.clone()),
            input_audio_transcription: self.input_transcription.then(AudioTranscriptionConfig::default),
            output_audio_transcription: self.output_transcription.then(AudioTranscriptionConfig::default),
        })
    }
}

/// One transport-encoded block of microphone audio
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeAudio {
    /// Base64 little-endian 16-bit PCM
    pub data: String,
    pub mime_type: String,
}

impl RealtimeAudio {
    pub fn pcm16(data: String) -> Self {
        Self {
            data,
            mime_type: INPUT_AUDIO_MIME.to_string(),
        }
    }

    pub fn to_message(&self) -> ClientMessage {
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: Blob {
                data: self.data.clone(),
                mime_type: self.mime_type.clone(),
            },
        })
    }
}

/// Inbound server content reduced to the fields the session reacts to
///
/// Any subset may be present on one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerEvent {
    /// Base64 PCM reply chunks, in order
    pub audio: Vec<String>,
    pub input_transcription: Option<String>,
    pub output_transcription: Option<String>,
    pub turn_complete: bool,
    pub interrupted: bool,
}

impl ServerEvent {
    pub fn input(text: impl Into<String>) -> Self {
        Self {
            input_transcription: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output_transcription: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn audio(data: impl Into<String>) -> Self {
        Self {
            audio: vec![data.into()],
            ..Default::default()
        }
    }

    pub fn turn_complete() -> Self {
        Self {
            turn_complete: true,
            ..Default::default()
        }
    }

    pub fn interrupted() -> Self {
        Self {
            interrupted: true,
            ..Default::default()
        }
    }
}

impl From<ServerContent> for ServerEvent {
    fn from(content: ServerContent) -> Self {
        let audio = content
            .model_turn
            .map(|turn| {
                turn.parts
                    .into_iter()
                    .filter_map(|part| part.inline_data)
                    .filter(|blob| blob.mime_type.starts_with("audio/"))
                    .map(|blob| blob.data)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            audio,
            input_transcription: content.input_transcription.and_then(|t| t.text),
            output_transcription: content.output_transcription.and_then(|t| t.text),
            turn_complete: content.turn_complete.unwrap_or(false),
            interrupted: content.interrupted.unwrap_or(false),
        }
    }
}

/// Everything the transport can report after the session is open
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Server(ServerEvent),
    /// Server announced it will disconnect soon
    GoAway { time_left: Option<String> },
    /// The connection failed; terminal for the session
    Error(String),
    /// The connection closed cleanly
    Closed { reason: Option<String> },
}

/// Sending half of an open session
#[async_trait::async_trait]
pub trait LiveSender: Send + Sync {
    /// Queue one audio block. Fire-and-forget: there is no acknowledgement.
    fn send_audio(&self, audio: RealtimeAudio) -> LiveResult<()>;

    /// Close the session
    async fn close(&self) -> LiveResult<()>;
}

/// An open session: the sending handle plus the inbound event stream
pub struct LiveConnection {
    pub sender: Box<dyn LiveSender>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens realtime sessions
#[async_trait::async_trait]
pub trait LiveTransport: Send + Sync {
    /// Connect and wait for the server's open acknowledgement
    async fn connect(&self, setup: &SessionSetup) -> LiveResult<LiveConnection>;
}
