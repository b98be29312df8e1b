//! Voice session lifecycle
//!
//! A `VoiceSession` ties the pieces together:
//! - Credential fetch and recognizer connection
//! - Audio capture and chunk forwarding
//! - Transcript debouncing and the dialogue relay
//! - One-at-a-time reply playback
//!
//! It moves through `Idle -> Connecting -> Listening -> Ending -> Idle`.

mod config;
mod handle;
#[allow(clippy::module_inception)]
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use handle::{SessionHandle, Startup};
pub use session::{Collaborators, VoiceSession};
pub use state::{SessionCommand, SessionState, SessionUpdate, INFERENCE_FAILED_MESSAGE};
pub use stats::{Exchange, SessionStats};
