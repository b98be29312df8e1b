use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    /// When the session last started
    pub started_at: DateTime<Utc>,

    /// Time since `started_at` in seconds
    pub duration_secs: f64,

    /// Chunks handed to the recognizer
    pub chunks_sent: u64,

    /// Chunks dropped because the connection was not writable
    pub chunks_dropped: u64,

    /// Transcripts that passed the debounce gate
    pub transcripts_accepted: u64,

    /// Completed transcript/reply pairs
    pub exchanges_count: u64,

    /// Whether a reply is being synthesized or played
    pub speaking: bool,
}

/// One transcript and the assistant's reply to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub session_id: String,

    /// When the reply arrived
    pub timestamp: DateTime<Utc>,

    /// What the user said
    pub user: String,

    pub sentiment: String,

    /// What the assistant answered
    pub ai: String,
}
