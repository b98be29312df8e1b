use std::sync::Arc;
use tokio::sync::RwLock;

use crate::audio::{AudioFormat, MediaSourceFactory, SourceKind};
use crate::config::Config;
use crate::session::{Collaborators, SessionConfig, SessionHandle, VoiceSession};
use crate::Result;

/// Builds a fresh session for each start request
pub type SessionFactory = Arc<dyn Fn() -> Result<VoiceSession> + Send + Sync>;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single active session, if any
    pub session: Arc<RwLock<Option<SessionHandle>>>,

    pub factory: SessionFactory,
}

impl AppState {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            session: Arc::new(RwLock::new(None)),
            factory,
        }
    }

    /// Sessions wired to the configured backend, capturing from `source`
    pub fn from_config(config: Config, source: SourceKind) -> Self {
        let factory: SessionFactory = Arc::new(move || {
            let format = AudioFormat {
                sample_rate: config.audio.sample_rate,
                channels: config.audio.channels,
            };
            let media = MediaSourceFactory::create(source.clone(), format)?;
            let collaborators = Collaborators::from_config(&config)?;
            Ok(VoiceSession::new(
                SessionConfig::from(&config),
                collaborators,
                media,
            ))
        });

        Self::new(factory)
    }
}
