pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod session;

pub use audio::{
    AudioBackendConfig, AudioBackendFactory, AudioBridge, AudioDevices, AudioFile, AudioFrame,
    AudioLevels, AudioOutput, AudioSource, CaptureBackend, PlaybackSink,
};
pub use config::Config;
pub use error::{LiveError, LiveResult};
pub use http::{create_router, AppState};
pub use live::{GeminiLiveClient, LiveTransport, ServerEvent, SessionSetup, TransportEvent};
pub use session::{
    ConnectionStatus, ConversationSnapshot, Message, SessionConfig, SessionController,
    SessionHandle, SessionStats, StartOutcome,
};
