// In-memory stand-ins for every service a voice session talks to

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use talkback::audio::MediaStream;
use talkback::recognizer::{link_pair, LinkPeer};
use talkback::session::{SessionCommand, SessionStats, SessionUpdate};
use talkback::{
    AudioFormat, AudioFrame, AudioSink, Collaborators, Credential, CredentialFetcher,
    DialogueRelay, Error, MediaSource, RecognizerConnector, RecognizerLink, SessionConfig,
    Synthesizer, VoiceSession,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

pub const REPLY: &str = "Sure, turning them on now.";

// ============================================================================
// Credentials
// ============================================================================

pub struct StaticCredentials {
    key: Option<&'static str>,
}

impl StaticCredentials {
    pub fn new(key: &'static str) -> Self {
        Self { key: Some(key) }
    }

    pub fn missing() -> Self {
        Self { key: None }
    }
}

#[async_trait]
impl CredentialFetcher for StaticCredentials {
    async fn fetch_credential(&self) -> talkback::Result<Credential> {
        self.key
            .map(Credential::new)
            .ok_or_else(|| Error::Auth("No API key returned".to_string()))
    }
}

// ============================================================================
// Recognizer
// ============================================================================

enum ConnectMode {
    Links(Mutex<VecDeque<RecognizerLink>>),
    Fail,
    Hang,
}

pub struct ChannelConnector {
    mode: ConnectMode,
    keys: Mutex<Vec<String>>,
}

impl ChannelConnector {
    /// Connector handing out one in-memory link; the test drives its peer
    pub fn new() -> (Self, LinkPeer) {
        let (connector, mut peers) = Self::with_links(1);
        (connector, peers.remove(0))
    }

    /// One link per connect, in order, for sessions that restart
    pub fn with_links(count: usize) -> (Self, Vec<LinkPeer>) {
        let (links, peers): (VecDeque<_>, Vec<_>) = (0..count).map(|_| link_pair()).unzip();
        let connector = Self {
            mode: ConnectMode::Links(Mutex::new(links)),
            keys: Mutex::new(Vec::new()),
        };
        (connector, peers)
    }

    pub fn failing() -> Self {
        Self {
            mode: ConnectMode::Fail,
            keys: Mutex::new(Vec::new()),
        }
    }

    /// Connector whose handshake never completes
    pub fn hanging() -> Self {
        Self {
            mode: ConnectMode::Hang,
            keys: Mutex::new(Vec::new()),
        }
    }

    /// Credentials the session connected with
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecognizerConnector for ChannelConnector {
    async fn connect(
        &self,
        credential: &Credential,
        _format: AudioFormat,
    ) -> talkback::Result<RecognizerLink> {
        self.keys
            .lock()
            .unwrap()
            .push(credential.expose().to_string());

        match &self.mode {
            ConnectMode::Links(links) => links
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Connection("no links left".to_string())),
            ConnectMode::Fail => Err(Error::Connection("handshake rejected".to_string())),
            ConnectMode::Hang => std::future::pending().await,
        }
    }
}

/// A finalized recognizer result carrying `text`
pub fn final_transcript(text: &str) -> String {
    serde_json::json!({
        "type": "Results",
        "is_final": true,
        "speech_final": true,
        "channel": {
            "alternatives": [{ "transcript": text, "confidence": 0.97 }]
        }
    })
    .to_string()
}

pub fn interim_transcript(text: &str) -> String {
    serde_json::json!({
        "type": "Results",
        "is_final": false,
        "channel": {
            "alternatives": [{ "transcript": text, "confidence": 0.6 }]
        }
    })
    .to_string()
}

// ============================================================================
// Dialogue
// ============================================================================

pub struct ScriptedRelay {
    reply: String,
    delay: Duration,
    failing: AtomicBool,
    asks: Mutex<Vec<(String, String)>>,
}

impl ScriptedRelay {
    pub fn new(reply: &str) -> Self {
        Self::delayed(reply, Duration::ZERO)
    }

    pub fn delayed(reply: &str, delay: Duration) -> Self {
        Self {
            reply: reply.to_string(),
            delay,
            failing: AtomicBool::new(false),
            asks: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `(text, sentiment)` of every request so far
    pub fn asks(&self) -> Vec<(String, String)> {
        self.asks.lock().unwrap().clone()
    }
}

#[async_trait]
impl DialogueRelay for ScriptedRelay {
    async fn ask(&self, text: &str, sentiment: &str) -> talkback::Result<String> {
        self.asks
            .lock()
            .unwrap()
            .push((text.to_string(), sentiment.to_string()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Inference("model unavailable".to_string()));
        }
        Ok(self.reply.clone())
    }
}

// ============================================================================
// Playback
// ============================================================================

/// Returns the reply text as its "audio"
#[derive(Default)]
pub struct EchoSynthesizer {
    keys: Mutex<Vec<String>>,
}

impl EchoSynthesizer {
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn synthesize(&self, credential: &Credential, text: &str) -> talkback::Result<Vec<u8>> {
        self.keys
            .lock()
            .unwrap()
            .push(credential.expose().to_string());
        Ok(text.as_bytes().to_vec())
    }
}

/// "Plays" every reply for a fixed duration
pub struct TimedSink {
    duration: Duration,
    rendered: Mutex<Vec<Vec<u8>>>,
    completed: Mutex<Vec<u64>>,
}

impl TimedSink {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            rendered: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn rendered(&self) -> Vec<Vec<u8>> {
        self.rendered.lock().unwrap().clone()
    }

    /// Playbacks that ran for their full duration
    pub fn completed(&self) -> Vec<u64> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for TimedSink {
    async fn render(
        &self,
        id: u64,
        audio: Arc<[u8]>,
        stop: oneshot::Receiver<()>,
    ) -> talkback::Result<()> {
        self.rendered.lock().unwrap().push(audio.to_vec());

        tokio::select! {
            () = tokio::time::sleep(self.duration) => self.completed.lock().unwrap().push(id),
            _ = stop => {}
        }

        Ok(())
    }
}

// ============================================================================
// Media
// ============================================================================

/// Produces a constant tone in 20 ms frames until released
#[derive(Default)]
pub struct ToneSource {
    fail: bool,
    acquisitions: AtomicUsize,
    released: Arc<AtomicBool>,
}

impl ToneSource {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSource for ToneSource {
    async fn acquire(&self) -> talkback::Result<MediaStream> {
        if self.fail {
            return Err(Error::Media("permission denied".to_string()));
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(20));
            let mut timestamp_ms = 0;
            loop {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: vec![1000; 320],
                    sample_rate: 16000,
                    channels: 1,
                    timestamp_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
                timestamp_ms += 20;
            }
        });

        let released = Arc::clone(&self.released);
        Ok(MediaStream::with_release(rx, move || {
            released.store(true, Ordering::SeqCst);
        }))
    }

    fn name(&self) -> &str {
        "tone"
    }
}

// ============================================================================
// Session harness
// ============================================================================

pub struct Fakes {
    pub credentials: Arc<StaticCredentials>,
    pub connector: Arc<ChannelConnector>,
    pub relay: Arc<ScriptedRelay>,
    pub synthesizer: Arc<EchoSynthesizer>,
    pub sink: Arc<TimedSink>,
    pub source: Arc<ToneSource>,
}

impl Fakes {
    /// Working collaborators; replies play for one second
    pub fn new() -> (Self, LinkPeer) {
        let (connector, peer) = ChannelConnector::new();
        let fakes = Self {
            credentials: Arc::new(StaticCredentials::new("abc")),
            connector: Arc::new(connector),
            relay: Arc::new(ScriptedRelay::new(REPLY)),
            synthesizer: Arc::new(EchoSynthesizer::default()),
            sink: Arc::new(TimedSink::new(Duration::from_secs(1))),
            source: Arc::new(ToneSource::default()),
        };
        (fakes, peer)
    }

    pub fn session(&self) -> VoiceSession {
        let config = SessionConfig {
            session_id: "session-test".to_string(),
            ..SessionConfig::default()
        };
        let collaborators = Collaborators {
            credentials: self.credentials.clone(),
            connector: self.connector.clone(),
            relay: self.relay.clone(),
            synthesizer: self.synthesizer.clone(),
            sink: self.sink.clone(),
        };
        VoiceSession::new(config, collaborators, self.source.clone())
    }
}

pub type SessionTask = JoinHandle<(VoiceSession, talkback::Result<SessionStats>)>;

/// Run `session` on its own task, handing it back once it ends
pub fn spawn_session(mut session: VoiceSession) -> (mpsc::Sender<SessionCommand>, SessionTask) {
    let (commands, command_rx) = mpsc::channel(4);
    let task = tokio::spawn(async move {
        let result = session.run(command_rx).await;
        (session, result)
    });
    (commands, task)
}

/// Skip updates until one matches
pub async fn expect_update(
    updates: &mut broadcast::Receiver<SessionUpdate>,
    matches: impl Fn(&SessionUpdate) -> bool,
) -> SessionUpdate {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let update = updates.recv().await.expect("session updates closed");
            if matches(&update) {
                return update;
            }
        }
    })
    .await
    .expect("timed out waiting for session update")
}

/// Poll `condition` until it holds
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}
