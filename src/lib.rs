pub mod audio;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod recognizer;
pub mod relay;
pub mod session;
pub mod transcript;

pub use audio::{
    AudioChunk, AudioFile, AudioFormat, AudioFrame, CaptureSession, MediaSource,
    MediaSourceFactory, SourceKind, WavFileSource,
};
pub use auth::{Credential, CredentialFetcher, HttpCredentialFetcher};
pub use config::Config;
pub use error::{Error, Result};
pub use http::{create_router, AppState};
pub use playback::{AudioSink, FileSink, PlaybackCoordinator, SpeakOutcome, Synthesizer};
pub use recognizer::{DeepgramConnector, RecognizerConnector, RecognizerLink};
pub use relay::{DialogueRelay, HttpDialogueRelay};
pub use session::{
    Collaborators, Exchange, SessionCommand, SessionConfig, SessionHandle, SessionState,
    SessionStats, SessionUpdate, VoiceSession,
};
pub use transcript::{DebounceGate, TranscriptConsumer, TranscriptEvent, DEBOUNCE_WINDOW};
