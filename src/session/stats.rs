use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conversation::ConnectionStatus;

/// Statistics about a live session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current connection status
    pub status: ConnectionStatus,

    /// When the current (or last) session started
    pub started_at: Option<DateTime<Utc>>,

    /// Session duration in seconds
    pub duration_secs: f64,

    /// Microphone frames delivered by the capture backend
    pub frames_captured: u64,

    /// Frames that passed the noise gate and were sent
    pub frames_sent: u64,

    /// Frames dropped as silence
    pub frames_gated: u64,

    /// Reply chunks scheduled for playback
    pub chunks_played: u64,

    /// Reply chunks that failed to decode
    pub chunks_dropped: u64,

    /// Barge-in interruptions
    pub interruptions: u64,

    /// Turns that produced at least one message
    pub turns_completed: u64,
}

impl SessionStats {
    /// Counters for a session starting now
    pub fn starting() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Copy with `status` and `duration_secs` filled in as of now
    pub fn as_of(&self, status: ConnectionStatus, ended_at: Option<DateTime<Utc>>) -> Self {
        let duration_secs = self
            .started_at
            .map(|start| {
                let end = ended_at.unwrap_or_else(Utc::now);
                end.signed_duration_since(start).num_milliseconds() as f64 / 1000.0
            })
            .unwrap_or(0.0);

        Self {
            status,
            duration_secs,
            ..self.clone()
        }
    }
}
