use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

/// Text shown to the user when the assistant could not answer
pub const INFERENCE_FAILED_MESSAGE: &str = "AI Error.";

/// Lifecycle of a voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    /// Fetching a credential, acquiring media, opening the recognizer
    Connecting,
    Listening,
    /// Releasing everything on the way back to idle
    Ending,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Listening => "listening",
            Self::Ending => "ending",
        };
        f.write_str(name)
    }
}

/// Requests sent to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Stop,
}

/// What the user sees while a session runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionUpdate {
    Listening,
    /// A finalized utterance passed the debounce gate
    Transcript { text: String, sentiment: String },
    /// The transcript is with the assistant
    Thinking,
    Reply { text: String },
    InferenceFailed { message: String },
    Ended,
}

impl fmt::Display for SessionUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening => f.write_str("Listening..."),
            Self::Transcript { text, sentiment } => write!(f, "You: {text} ({sentiment})"),
            Self::Thinking => f.write_str("AI thinking..."),
            Self::Reply { text } => write!(f, "AI: {text}"),
            Self::InferenceFailed { message } => f.write_str(message),
            Self::Ended => f.write_str("Stopped."),
        }
    }
}

/// Completion of work the session spawned, tagged with the epoch it belongs to
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Reply {
        epoch: u64,
        text: String,
        sentiment: String,
        result: Result<String>,
    },
}
