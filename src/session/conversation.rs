use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use crate::live::ServerEvent;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A finalized turn entry. Never edited once it is in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Side effects requested by [`TurnState::apply`]
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Decode and schedule one base64 PCM reply chunk
    Play(String),
    /// Barge-in: silence all reply audio now
    StopPlayback,
    /// Finalized messages for the log, user first
    Commit(Vec<Message>),
}

/// Per-turn transcript and latency tracking
///
/// The live partials are the buffers themselves: every fragment appended
/// is immediately visible, and clearing a buffer clears its partial.
#[derive(Debug, Clone, Default)]
pub struct TurnState {
    user_buffer: String,
    assistant_buffer: String,
    assistant_speaking: bool,
    last_user_audio_at: Option<Instant>,
    reply_received: bool,
    latency_secs: Option<f64>,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one server event into the turn
    ///
    /// Fields are handled in a fixed order: audio, input transcription,
    /// output transcription, turn complete, interrupted.
    pub fn apply(&mut self, event: &ServerEvent, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();

        for chunk in &event.audio {
            if !self.reply_received {
                if let Some(user_at) = self.last_user_audio_at {
                    self.latency_secs = Some(round2(now.saturating_duration_since(user_at).as_secs_f64()));
                }
                self.reply_received = true;
            }
            self.assistant_speaking = true;
            effects.push(Effect::Play(chunk.clone()));
        }

        if let Some(text) = &event.input_transcription {
            self.user_buffer.push_str(text);
            self.last_user_audio_at = Some(now);
            self.reply_received = false;
        }

        if let Some(text) = &event.output_transcription {
            self.assistant_buffer.push_str(text);
        }

        if event.turn_complete {
            let mut messages = Vec::new();
            if !self.user_buffer.is_empty() {
                messages.push(Message::new(Sender::User, std::mem::take(&mut self.user_buffer)));
            }
            if !self.assistant_buffer.is_empty() {
                messages.push(Message::new(Sender::Assistant, std::mem::take(&mut self.assistant_buffer)));
            }
            if !messages.is_empty() {
                effects.push(Effect::Commit(messages));
            }
            self.assistant_speaking = false;
        }

        if event.interrupted {
            effects.push(Effect::StopPlayback);
            self.assistant_buffer.clear();
            self.assistant_speaking = false;
            self.reply_received = false;
        }

        effects
    }

    /// Drop everything in flight for the current turn
    pub fn clear(&mut self) {
        self.user_buffer.clear();
        self.assistant_buffer.clear();
        self.assistant_speaking = false;
        self.reply_received = false;
    }

    pub fn stop_speaking(&mut self) {
        self.assistant_speaking = false;
    }

    pub fn user_partial(&self) -> &str {
        &self.user_buffer
    }

    pub fn assistant_partial(&self) -> &str {
        &self.assistant_buffer
    }

    pub fn is_assistant_speaking(&self) -> bool {
        self.assistant_speaking
    }

    pub fn latency_secs(&self) -> Option<f64> {
        self.latency_secs
    }
}

fn round2(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

/// Append-only message log plus the turn in progress
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    turn: TurnState,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a server event, committing finalized messages to the log
    ///
    /// Returns every effect, including commits, so the caller can count them.
    pub fn handle(&mut self, event: &ServerEvent, now: Instant) -> Vec<Effect> {
        let effects = self.turn.apply(event, now);
        for effect in &effects {
            if let Effect::Commit(messages) = effect {
                self.messages.extend(messages.iter().cloned());
            }
        }
        effects
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn turn(&self) -> &TurnState {
        &self.turn
    }

    pub fn turn_mut(&mut self) -> &mut TurnState {
        &mut self.turn
    }
}

/// Everything a UI needs to render the session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationSnapshot {
    pub status: ConnectionStatus,
    pub messages: Vec<Message>,
    /// Assistant is speaking
    pub is_typing: bool,
    pub user_partial: String,
    pub assistant_partial: String,
    /// First-reply latency in seconds, 2 decimals
    pub latency_secs: Option<f64>,
    pub error: Option<String>,
}

impl ConversationSnapshot {
    pub fn capture(conversation: &Conversation, status: ConnectionStatus, error: Option<String>) -> Self {
        let turn = conversation.turn();
        Self {
            status,
            messages: conversation.messages().to_vec(),
            is_typing: turn.is_assistant_speaking(),
            user_partial: turn.user_partial().to_string(),
            assistant_partial: turn.assistant_partial().to_string(),
            latency_secs: turn.latency_secs(),
            error,
        }
    }
}
