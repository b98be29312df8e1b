//! Error types for the voice session

use thiserror::Error;

/// Result type alias for talkback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a voice session
#[derive(Debug, Error)]
pub enum Error {
    /// Speech provider credential could not be obtained
    #[error("auth error: {0}")]
    Auth(String),

    /// Media source (microphone, file) could not be acquired
    #[error("media error: {0}")]
    Media(String),

    /// Hosted inference call failed
    #[error("inference error: {0}")]
    Inference(String),

    /// Text-to-speech call failed
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Recognizer connection could not be opened or broke
    #[error("connection error: {0}")]
    Connection(String),

    /// Audio could not be decoded or rendered
    #[error("playback error: {0}")]
    Playback(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation not valid in the current session state
    #[error("session error: {0}")]
    Session(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error aborts session start
    #[must_use]
    pub const fn is_fatal_to_start(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Media(_) | Self::Connection(_))
    }
}
