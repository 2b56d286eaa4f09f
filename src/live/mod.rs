//! Realtime model session
//!
//! - `transport`: the session seam (`LiveTransport` / `LiveSender`) and the
//!   events the controller consumes
//! - `messages`: Live API wire types
//! - `client`: WebSocket implementation against the Gemini Live endpoint

pub mod client;
pub mod messages;
pub mod transport;

pub use client::GeminiLiveClient;
pub use transport::{
    LiveConnection, LiveSender, LiveTransport, RealtimeAudio, ServerEvent, SessionSetup,
    TransportEvent, INPUT_AUDIO_MIME,
};
