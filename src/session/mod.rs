//! Live session management
//!
//! This module provides the `SessionController` that manages:
//! - The realtime model session lifecycle (connect, open, close, error)
//! - Microphone streaming through the noise gate
//! - Reply playback and barge-in interruption
//! - Turn-based transcript accumulation into the conversation log
//! - Session statistics and observable state

mod config;
mod controller;
mod conversation;
mod gate;
mod policy;
mod stats;

pub use config::{SessionConfig, DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VOICE};
pub use controller::{PlaybackState, SessionController, SessionHandle, StartOutcome};
pub use conversation::{
    ConnectionStatus, Conversation, ConversationSnapshot, Effect, Message, Sender, TurnState,
};
pub use gate::{NoiseGate, DEFAULT_NOISE_GATE_THRESHOLD};
pub use policy::{ErrorClass, ErrorPolicy};
pub use stats::SessionStats;
