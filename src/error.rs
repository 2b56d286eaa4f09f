use thiserror::Error;

/// Errors raised by the session, audio and transport layers
#[derive(Debug, Error)]
pub enum LiveError {
    /// Microphone access was refused
    #[error("microphone permission denied: {0}")]
    Permission(String),

    /// Audio hardware could not be initialised
    #[error("audio device error: {0}")]
    Device(String),

    /// The realtime session failed or could not be established
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound payload was not valid base64
    #[error("failed to decode audio payload: {0}")]
    Decode(#[from] base64::DecodeError),

    /// PCM bytes did not line up with the sample frame size
    #[error("invalid PCM layout: {len} bytes is not a multiple of the {frame_size}-byte frame")]
    Format { len: usize, frame_size: usize },

    /// Waiting on the remote side took too long
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The session event loop is no longer running
    #[error("session controller has shut down")]
    ControllerGone,
}

impl LiveError {
    /// True for failures that happen while acquiring audio hardware
    pub fn is_device_failure(&self) -> bool {
        matches!(self, LiveError::Permission(_) | LiveError::Device(_))
    }
}

pub type LiveResult<T> = Result<T, LiveError>;
