use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::state::{
    SessionCommand, SessionEvent, SessionState, SessionUpdate, INFERENCE_FAILED_MESSAGE,
};
use super::stats::{Exchange, SessionStats};
use crate::audio::{AudioChunk, CaptureSession, MediaSource};
use crate::auth::{Credential, CredentialFetcher, HttpCredentialFetcher};
use crate::config::{Config, OutputKind};
use crate::playback::{
    AudioSink, DeepgramSynthesizer, FileSink, PlaybackCoordinator, SpeakOutcome, Synthesizer,
};
use crate::recognizer::{DeepgramConnector, RecognizerConnector, RecognizerLink};
use crate::relay::{DialogueRelay, HttpDialogueRelay};
use crate::transcript::{AcceptedTranscript, TranscriptConsumer};
use crate::{Error, Result};

/// Observers that lag further behind than this lose the oldest updates
const UPDATE_CAPACITY: usize = 64;

/// Timeout for every request to the hosted function and the speech provider
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// External services a session talks to
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialFetcher>,
    pub connector: Arc<dyn RecognizerConnector>,
    pub relay: Arc<dyn DialogueRelay>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub sink: Arc<dyn AudioSink>,
}

impl Collaborators {
    /// HTTP and WebSocket clients for the configured backend
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid URLs or an unavailable output
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let credentials = HttpCredentialFetcher::new(
            client.clone(),
            &config.backend.function_url,
            &config.backend.auth_route,
        )?;
        let relay = HttpDialogueRelay::new(client.clone(), &config.backend.function_url)?;
        let synthesizer = DeepgramSynthesizer::new(client, &config.speech)?;

        let sink: Arc<dyn AudioSink> = match config.audio.output {
            OutputKind::File => Arc::new(FileSink::new(&config.audio.playback_dir)?),
            OutputKind::Speaker => speaker_sink()?,
        };

        Ok(Self {
            credentials: Arc::new(credentials),
            connector: Arc::new(DeepgramConnector::new(&config.speech)),
            relay: Arc::new(relay),
            synthesizer: Arc::new(synthesizer),
            sink,
        })
    }
}

#[cfg(feature = "device-audio")]
fn speaker_sink() -> Result<Arc<dyn AudioSink>> {
    Ok(Arc::new(crate::playback::SpeakerSink))
}

#[cfg(not(feature = "device-audio"))]
fn speaker_sink() -> Result<Arc<dyn AudioSink>> {
    Err(Error::Config(
        "speaker output requires the `device-audio` feature".to_string(),
    ))
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    chunks_sent: u64,
    chunks_dropped: u64,
    transcripts_accepted: u64,
    exchanges: u64,
}

/// A voice conversation: capture, recognition, relay and playback
///
/// Every piece of mutable session state is owned here and only touched from
/// the task driving [`VoiceSession::run`]. Network round trips run in spawned
/// tasks and report back as events tagged with the current epoch; anything
/// from an earlier epoch is dropped.
pub struct VoiceSession {
    config: SessionConfig,
    credentials: Arc<dyn CredentialFetcher>,
    connector: Arc<dyn RecognizerConnector>,
    relay: Arc<dyn DialogueRelay>,
    source: Arc<dyn MediaSource>,

    state: SessionState,
    epoch: u64,
    credential: Option<Credential>,
    capture: Option<CaptureSession>,
    chunks: Option<mpsc::Receiver<AudioChunk>>,
    link: Option<RecognizerLink>,
    consumer: TranscriptConsumer,
    playback: PlaybackCoordinator,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,

    started_at: DateTime<Utc>,
    counters: Counters,
    updates: broadcast::Sender<SessionUpdate>,
    stats_tx: watch::Sender<SessionStats>,
    exchanges: Arc<RwLock<Vec<Exchange>>>,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        collaborators: Collaborators,
        source: Arc<dyn MediaSource>,
    ) -> Self {
        let Collaborators {
            credentials,
            connector,
            relay,
            synthesizer,
            sink,
        } = collaborators;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let started_at = Utc::now();
        let consumer = TranscriptConsumer::new(config.debounce_window);

        let (stats_tx, _) = watch::channel(SessionStats {
            session_id: config.session_id.clone(),
            state: SessionState::Idle,
            started_at,
            duration_secs: 0.0,
            chunks_sent: 0,
            chunks_dropped: 0,
            transcripts_accepted: 0,
            exchanges_count: 0,
            speaking: false,
        });

        info!("Created voice session: {}", config.session_id);

        Self {
            config,
            credentials,
            connector,
            relay,
            source,
            state: SessionState::Idle,
            epoch: 0,
            credential: None,
            capture: None,
            chunks: None,
            link: None,
            consumer,
            playback: PlaybackCoordinator::new(synthesizer, sink),
            events_tx,
            events_rx,
            started_at,
            counters: Counters::default(),
            updates,
            stats_tx,
            exchanges: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a reply is being synthesized or played
    pub const fn is_speaking(&self) -> bool {
        self.playback.is_speaking()
    }

    /// Receive user-visible updates
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Statistics, refreshed after every handled event
    pub fn watch_stats(&self) -> watch::Receiver<SessionStats> {
        self.stats_tx.subscribe()
    }

    /// Dialogue history, shared with observers
    pub fn exchanges(&self) -> Arc<RwLock<Vec<Exchange>>> {
        Arc::clone(&self.exchanges)
    }

    /// Current session statistics
    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            session_id: self.config.session_id.clone(),
            state: self.state,
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_sent: self.counters.chunks_sent,
            chunks_dropped: self.counters.chunks_dropped,
            transcripts_accepted: self.counters.transcripts_accepted,
            exchanges_count: self.counters.exchanges,
            speaking: self.playback.is_speaking(),
        }
    }

    /// Start, listen until stopped or disconnected, then tear down
    ///
    /// A `Stop` received while still connecting abandons the start. Dropping
    /// every command sender counts as a stop.
    ///
    /// # Errors
    ///
    /// Returns the start failure; the session is back in `Idle` by then
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) -> Result<SessionStats> {
        let started = tokio::select! {
            result = self.start() => Some(result),
            _ = commands.recv() => None,
        };

        match started {
            Some(Ok(())) => self.listen(&mut commands).await,
            Some(Err(e)) => return Err(e),
            None => info!("Stop requested while connecting"),
        }

        self.stop().await;
        Ok(self.stats())
    }

    /// Fetch a credential, acquire media, connect and start capturing
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] unless idle, otherwise the first failing
    /// step ([`Error::Auth`], [`Error::Media`], [`Error::Connection`]). On
    /// failure everything acquired so far is released and the session is idle.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::Session(format!(
                "cannot start a session that is {}",
                self.state
            )));
        }

        self.epoch += 1;
        self.consumer = TranscriptConsumer::new(self.config.debounce_window);
        self.counters = Counters::default();
        self.started_at = Utc::now();
        self.set_state(SessionState::Connecting);

        match self.connect().await {
            Ok(()) => {
                self.set_state(SessionState::Listening);
                self.publish(SessionUpdate::Listening);
                info!("Session {} listening", self.config.session_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start session {}: {}", self.config.session_id, e);
                self.release().await;
                self.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Each acquired resource is stored as soon as it exists so an abandoned
    /// start can still be torn down
    async fn connect(&mut self) -> Result<()> {
        let credential = self.credentials.fetch_credential().await?;
        self.credential = Some(credential.clone());

        let capture = CaptureSession::open(self.source.as_ref(), self.config.format).await?;
        let capture = self.capture.insert(capture);

        let link = self
            .connector
            .connect(&credential, self.config.format)
            .await?;
        self.link = Some(link);

        self.chunks = Some(capture.start(self.config.chunk_interval)?);

        Ok(())
    }

    /// Stop capturing, close the connection and silence playback
    ///
    /// No-op when idle.
    pub async fn stop(&mut self) {
        if self.state == SessionState::Idle {
            debug!("Session {} already idle", self.config.session_id);
            return;
        }

        info!("Stopping session {} ({})", self.config.session_id, self.state);
        self.set_state(SessionState::Ending);
        self.release().await;
        self.set_state(SessionState::Idle);
        self.publish(SessionUpdate::Ended);

        info!(
            "Session {} stopped: {} chunks sent, {} dropped, {} exchanges",
            self.config.session_id,
            self.counters.chunks_sent,
            self.counters.chunks_dropped,
            self.counters.exchanges
        );
    }

    async fn release(&mut self) {
        // Anything still in flight now belongs to a finished epoch
        self.epoch += 1;

        if let Some(mut capture) = self.capture.take() {
            capture.stop().await;
        }
        self.chunks = None;

        if let Some(mut link) = self.link.take() {
            link.close().await;
        }

        self.playback.cancel();
        self.credential = None;
        self.publish_stats();
    }

    async fn listen(&mut self, commands: &mut mpsc::Receiver<SessionCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Stop) => info!("Stop requested"),
                        None => info!("Session controller went away"),
                    }
                    break;
                }

                chunk = next_chunk(&mut self.chunks) => match chunk {
                    Some(chunk) => self.forward_chunk(&chunk),
                    None => {
                        warn!("Media source ended; no more audio will be sent");
                        self.chunks = None;
                    }
                },

                message = next_message(&mut self.link) => match message {
                    Some(raw) => self.handle_message(&raw),
                    None => {
                        warn!("Recognizer connection closed");
                        break;
                    }
                },

                Some(event) = self.events_rx.recv() => self.handle_event(event).await,

                Some(event) = self.playback.next_event() => self.playback.handle_event(event),
            }

            self.publish_stats();
        }
    }

    fn forward_chunk(&mut self, chunk: &AudioChunk) {
        let sent = self
            .link
            .as_ref()
            .is_some_and(|link| link.send_audio(chunk));

        if sent {
            self.counters.chunks_sent += 1;
        } else {
            self.counters.chunks_dropped += 1;
            debug!(sequence = chunk.sequence, "Connection not writable, dropping chunk");
        }
    }

    fn handle_message(&mut self, raw: &str) {
        if let Some(accepted) = self.consumer.consume(raw, Instant::now()) {
            self.relay_transcript(accepted);
        }
    }

    fn relay_transcript(&mut self, accepted: AcceptedTranscript) {
        let AcceptedTranscript {
            text, sentiment, ..
        } = accepted;

        self.counters.transcripts_accepted += 1;
        info!(sentiment = %sentiment, "Transcript: {}", text);
        self.publish(SessionUpdate::Transcript {
            text: text.clone(),
            sentiment: sentiment.clone(),
        });
        self.publish(SessionUpdate::Thinking);

        let relay = Arc::clone(&self.relay);
        let events = self.events_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = relay.ask(&text, &sentiment).await;
            let _ = events.send(SessionEvent::Reply {
                epoch,
                text,
                sentiment,
                result,
            });
        });
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Reply {
                epoch,
                text,
                sentiment,
                result,
            } => {
                if epoch != self.epoch || self.state != SessionState::Listening {
                    debug!(epoch, "Ignoring reply from a finished session");
                    return;
                }

                match result {
                    Ok(reply) => {
                        info!("AI: {}", reply);
                        self.record_exchange(text, sentiment, reply.clone()).await;
                        self.publish(SessionUpdate::Reply {
                            text: reply.clone(),
                        });
                        self.speak(&reply);
                    }
                    Err(e) => {
                        warn!("Inference failed: {}", e);
                        self.publish(SessionUpdate::InferenceFailed {
                            message: INFERENCE_FAILED_MESSAGE.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn speak(&mut self, reply: &str) {
        let Some(credential) = self.credential.as_ref() else {
            debug!("No credential, not speaking reply");
            return;
        };

        if self.playback.speak(credential, reply) == SpeakOutcome::Dropped {
            debug!("Reply not spoken, another one is playing");
        }
    }

    async fn record_exchange(&mut self, user: String, sentiment: String, ai: String) {
        let exchange = Exchange {
            session_id: self.config.session_id.clone(),
            timestamp: Utc::now(),
            user,
            sentiment,
            ai,
        };
        self.exchanges.write().await.push(exchange);
        self.counters.exchanges += 1;
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("Session {}: {} -> {}", self.config.session_id, self.state, state);
        self.state = state;
        self.publish_stats();
    }

    fn publish(&self, update: SessionUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }

    fn publish_stats(&self) {
        self.stats_tx.send_replace(self.stats());
    }
}

async fn next_chunk(chunks: &mut Option<mpsc::Receiver<AudioChunk>>) -> Option<AudioChunk> {
    match chunks {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_message(link: &mut Option<RecognizerLink>) -> Option<String> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}
