use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use super::session::VoiceSession;
use super::state::{SessionCommand, SessionUpdate};
use super::stats::{Exchange, SessionStats};
use crate::{Error, Result};

/// A session running on its own task
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::Sender<SessionCommand>,
    stats: watch::Receiver<SessionStats>,
    exchanges: Arc<RwLock<Vec<Exchange>>>,
    task: JoinHandle<Result<SessionStats>>,
}

impl SessionHandle {
    /// Run `session` in the background without waiting for it to connect
    ///
    /// The returned [`Startup`] resolves once the session is listening or
    /// has ended. The handle can be stopped in the meantime.
    pub fn launch(mut session: VoiceSession) -> (Self, Startup) {
        let session_id = session.session_id().to_string();
        let stats = session.watch_stats();
        let exchanges = session.exchanges();
        let updates = session.subscribe();
        let (commands, command_rx) = mpsc::channel(4);

        let task = tokio::spawn(async move { session.run(command_rx).await });

        info!("Session {} running in background", session_id);

        let handle = Self {
            session_id,
            commands,
            stats,
            exchanges,
            task,
        };
        (handle, Startup { updates })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Latest published statistics
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }

    /// Exchanges recorded so far
    pub async fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges.read().await.clone()
    }

    /// Whether the session has already ended on its own
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the session and wait for teardown
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the session task panicked
    pub async fn stop(self) -> Result<SessionStats> {
        // Fails only if the session already ended
        let _ = self.commands.send(SessionCommand::Stop).await;
        self.join().await
    }

    /// Wait for the session to end on its own
    ///
    /// # Errors
    ///
    /// Returns the start failure, or [`Error::Session`] if the task panicked
    pub async fn join(self) -> Result<SessionStats> {
        self.task
            .await
            .map_err(|e| Error::Session(format!("session task failed: {e}")))?
    }
}

/// Startup progress of a launched session
pub struct Startup {
    updates: broadcast::Receiver<SessionUpdate>,
}

impl Startup {
    /// `true` once the session is listening, `false` if it ended first
    pub async fn listening(mut self) -> bool {
        loop {
            match self.updates.recv().await {
                Ok(SessionUpdate::Listening) => return true,
                Ok(SessionUpdate::Ended) | Err(RecvError::Closed) => return false,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
            }
        }
    }
}
