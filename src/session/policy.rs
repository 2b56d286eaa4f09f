use serde::{Deserialize, Serialize};

/// How a transport failure is presented to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Server-side hiccup; retrying later is likely to work
    Transient,
    Generic,
}

/// Maps failures to user-facing messages
///
/// Classification only changes the wording. Every transport error ends the
/// session and nothing is retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPolicy {
    /// Substrings that mark an error as transient
    pub transient_patterns: Vec<String>,
    pub transient_message: String,
    pub generic_message: String,
    /// Shown when devices or the connection cannot be acquired at start
    pub device_message: String,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            transient_patterns: vec!["Internal error".to_string(), "Network".to_string()],
            transient_message: "Connection interrupted. Reconnecting...".to_string(),
            generic_message: "Connection error. Please try again.".to_string(),
            device_message: "Could not access microphone or network.".to_string(),
        }
    }
}

impl ErrorPolicy {
    pub fn classify(&self, error: &str) -> ErrorClass {
        if self.transient_patterns.iter().any(|p| error.contains(p.as_str())) {
            ErrorClass::Transient
        } else {
            ErrorClass::Generic
        }
    }

    pub fn message_for(&self, error: &str) -> &str {
        match self.classify(error) {
            ErrorClass::Transient => &self.transient_message,
            ErrorClass::Generic => &self.generic_message,
        }
    }

    pub fn device_message(&self) -> &str {
        &self.device_message
    }
}
