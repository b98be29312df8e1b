use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::sink::{AudioSink, PlaybackHandle};
use super::synth::Synthesizer;
use crate::auth::Credential;
use crate::Result;

/// Completion of background playback work, fed back through
/// [`PlaybackCoordinator::handle_event`]
#[derive(Debug)]
pub enum PlaybackEvent {
    /// Synthesis round trip finished
    Synthesized { id: u64, result: Result<Vec<u8>> },
    /// Rendering ended naturally or failed
    Finished { id: u64, result: Result<()> },
}

/// What `speak` did with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Synthesis started for playback `id`
    Accepted(u64),
    /// A playback was already active; the text was discarded
    Dropped,
}

/// Guarantees at most one reply is audible at a time
///
/// While a reply is being synthesized or played, further `speak` calls are
/// dropped rather than queued or interrupting. All state lives here and is
/// only touched from the owning session's event loop.
pub struct PlaybackCoordinator {
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    events_tx: mpsc::UnboundedSender<PlaybackEvent>,
    events_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
    speaking: bool,
    current: Option<PlaybackHandle>,
    /// Synthesis in flight
    pending: Option<(u64, JoinHandle<()>)>,
    next_id: u64,
}

impl PlaybackCoordinator {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            synthesizer,
            sink,
            events_tx,
            events_rx,
            speaking: false,
            current: None,
            pending: None,
            next_id: 1,
        }
    }

    /// Speak `text` unless a reply is already active
    pub fn speak(&mut self, credential: &Credential, text: &str) -> SpeakOutcome {
        if self.speaking {
            debug!("Playback active, dropping reply: {}", text);
            return SpeakOutcome::Dropped;
        }

        self.speaking = true;

        // Unreachable while the flag check above runs first: the flag is only
        // cleared together with `current`. Kept so that reordering the guard
        // gives interrupt-and-replace.
        if let Some(mut previous) = self.current.take() {
            previous.stop();
        }

        let id = self.next_id;
        self.next_id += 1;

        let synthesizer = Arc::clone(&self.synthesizer);
        let events = self.events_tx.clone();
        let credential = credential.clone();
        let text = text.to_string();
        let task = tokio::spawn(async move {
            let result = synthesizer.synthesize(&credential, &text).await;
            let _ = events.send(PlaybackEvent::Synthesized { id, result });
        });
        self.pending = Some((id, task));

        debug!(id, "synthesizing reply");
        SpeakOutcome::Accepted(id)
    }

    /// Next background completion
    pub async fn next_event(&mut self) -> Option<PlaybackEvent> {
        self.events_rx.recv().await
    }

    /// Apply a background completion; stale events are ignored
    pub fn handle_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Synthesized { id, result } => {
                if !self.pending.as_ref().is_some_and(|(pending, _)| *pending == id) {
                    debug!(id, "ignoring stale synthesis result");
                    return;
                }
                self.pending = None;

                match result {
                    Ok(audio) => self.begin_playback(id, audio),
                    Err(e) => {
                        warn!(id, "TTS error: {}", e);
                        self.speaking = false;
                    }
                }
            }

            PlaybackEvent::Finished { id, result } => {
                if !self.current.as_ref().is_some_and(|h| h.id() == id) {
                    debug!(id, "ignoring stale playback completion");
                    return;
                }
                self.current = None;
                self.speaking = false;

                match result {
                    Ok(()) => debug!(id, "playback ended"),
                    Err(e) => warn!(id, "playback error: {}", e),
                }
            }
        }
    }

    fn begin_playback(&mut self, id: u64, audio: Vec<u8>) {
        let source: Arc<[u8]> = audio.into();
        let (stop_tx, stop_rx) = oneshot::channel();

        let sink = Arc::clone(&self.sink);
        let events = self.events_tx.clone();
        let rendered = Arc::clone(&source);
        let task = tokio::spawn(async move {
            let result = sink.render(id, rendered, stop_rx).await;
            let _ = events.send(PlaybackEvent::Finished { id, result });
        });

        info!(id, bytes = source.len(), "playing reply");
        self.current = Some(PlaybackHandle::new(id, source, stop_tx, task));
    }

    /// Stop any active playback and forget in-flight synthesis
    pub fn cancel(&mut self) {
        if let Some((id, task)) = self.pending.take() {
            debug!(id, "discarding in-flight synthesis");
            task.abort();
        }
        if let Some(mut handle) = self.current.take() {
            handle.stop();
        }
        self.speaking = false;
    }

    /// Whether a reply is being synthesized or played
    pub const fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// The active playback, once synthesis has finished
    pub const fn current(&self) -> Option<&PlaybackHandle> {
        self.current.as_ref()
    }
}
