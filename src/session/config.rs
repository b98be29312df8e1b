use std::time::Duration;

use crate::audio::AudioFormat;
use crate::config::Config;
use crate::transcript::DEBOUNCE_WINDOW;

/// Per-session settings derived from [`Config`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "session-3f2a...")
    pub session_id: String,

    /// How often captured audio is cut into a chunk
    /// Default: 250 ms
    pub chunk_interval: Duration,

    /// Minimum spacing between accepted transcripts
    pub debounce_window: Duration,

    /// PCM layout streamed to the recognizer
    pub format: AudioFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: new_session_id(),
            chunk_interval: Duration::from_millis(250),
            debounce_window: DEBOUNCE_WINDOW,
            format: AudioFormat::default(),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            session_id: new_session_id(),
            chunk_interval: Duration::from_millis(config.audio.chunk_interval_ms),
            debounce_window: DEBOUNCE_WINDOW,
            format: AudioFormat {
                sample_rate: config.audio.sample_rate,
                channels: config.audio.channels,
            },
        }
    }
}

fn new_session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4())
}
