use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::messages::RecognizerControl;
use crate::audio::{AudioChunk, AudioFormat};
use crate::auth::Credential;
use crate::config::SpeechConfig;
use crate::{Error, Result};

/// Messages buffered in either direction of a link
const LINK_CAPACITY: usize = 64;

/// How long `close` waits for the connection task to wind down
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on the WebSocket handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session side of a duplex recognizer connection
///
/// Audio goes out only while the link is writable; there is no buffering
/// beyond the channel itself. `recv` returning `None` means the remote end
/// closed the connection.
pub struct RecognizerLink {
    outbound: Option<mpsc::Sender<Vec<u8>>>,
    inbound: mpsc::Receiver<String>,
    writable: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

/// Remote side of a link, driven by a transport task or by tests
pub struct LinkPeer {
    /// Audio sent by the session
    pub audio: mpsc::Receiver<Vec<u8>>,
    /// Recognizer messages for the session
    pub messages: mpsc::Sender<String>,
    writable: Arc<AtomicBool>,
}

/// Create a connected link and its remote peer
pub fn link_pair() -> (RecognizerLink, LinkPeer) {
    let (audio_tx, audio_rx) = mpsc::channel(LINK_CAPACITY);
    let (message_tx, message_rx) = mpsc::channel(LINK_CAPACITY);
    let writable = Arc::new(AtomicBool::new(true));

    let link = RecognizerLink {
        outbound: Some(audio_tx),
        inbound: message_rx,
        writable: Arc::clone(&writable),
        task: None,
    };
    let peer = LinkPeer {
        audio: audio_rx,
        messages: message_tx,
        writable,
    };

    (link, peer)
}

impl RecognizerLink {
    /// Attach the task that owns the transport; it is awaited on close
    #[must_use]
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Whether a chunk sent now would go out
    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
            && self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Send a chunk; returns `false` if it was dropped
    pub fn send_audio(&self, chunk: &AudioChunk) -> bool {
        if !self.is_writable() {
            return false;
        }
        match &self.outbound {
            Some(tx) => tx.try_send(chunk.data.clone()).is_ok(),
            None => false,
        }
    }

    /// Next recognizer message; `None` once the connection is closed
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Close the connection from the session side
    pub async fn close(&mut self) {
        self.writable.store(false, Ordering::SeqCst);
        self.outbound.take();
        self.inbound.close();

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                warn!("Recognizer connection did not close in time, aborting");
                task.abort();
            }
        }
    }
}

impl LinkPeer {
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Whether the session still holds its end of the link
    pub fn is_open(&self) -> bool {
        !self.messages.is_closed()
    }
}

/// Opens duplex connections to a speech recognizer
#[async_trait]
pub trait RecognizerConnector: Send + Sync {
    /// Connect using `credential`, streaming audio in `format`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the connection cannot be opened
    async fn connect(&self, credential: &Credential, format: AudioFormat)
        -> Result<RecognizerLink>;
}

type WebSocketConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Deepgram live transcription over WebSocket
pub struct DeepgramConnector {
    listen_url: String,
    model: String,
    smart_format: bool,
    sentiment: bool,
    punctuate: bool,
    connect_timeout: Duration,
}

impl DeepgramConnector {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            listen_url: config.listen_url.clone(),
            model: config.stt_model.clone(),
            smart_format: config.smart_format,
            sentiment: config.sentiment,
            punctuate: config.punctuate,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build the WebSocket URL with query parameters
    fn build_url(&self, format: AudioFormat) -> Result<Url> {
        let mut url = Url::parse(&self.listen_url)
            .map_err(|e| Error::Config(format!("invalid listen url: {e}")))?;

        url.query_pairs_mut()
            .append_pair("model", &self.model)
            .append_pair("smart_format", &self.smart_format.to_string())
            .append_pair("sentiment", &self.sentiment.to_string())
            .append_pair("punctuate", &self.punctuate.to_string())
            .append_pair("encoding", "linear16")
            .append_pair("sample_rate", &format.sample_rate.to_string())
            .append_pair("channels", &format.channels.to_string());

        Ok(url)
    }
}

#[async_trait]
impl RecognizerConnector for DeepgramConnector {
    async fn connect(
        &self,
        credential: &Credential,
        format: AudioFormat,
    ) -> Result<RecognizerLink> {
        let url = self.build_url(format)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Connection(format!("invalid request: {e}")))?;

        // The key travels as the second subprotocol
        let protocols = HeaderValue::from_str(&format!("token, {}", credential.expose()))
            .map_err(|e| Error::Connection(format!("invalid credential header: {e}")))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, protocols);

        info!("Connecting to recognizer at {}", self.listen_url);

        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "handshake timed out after {}s",
                    self.connect_timeout.as_secs_f32()
                ))
            })?
            .map_err(|e| Error::Connection(e.to_string()))?;

        info!("Connected to recognizer");

        let (link, peer) = link_pair();
        let task = tokio::spawn(pump(ws_stream, peer));

        Ok(link.with_task(task))
    }
}

/// Move audio out and recognizer messages in until either side closes
async fn pump(ws_stream: WebSocketConnection, mut peer: LinkPeer) {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            audio = peer.audio.recv() => match audio {
                Some(bytes) => {
                    if let Err(e) = ws_sink.send(Message::binary(bytes)).await {
                        error!("Failed to send audio to recognizer: {}", e);
                        break;
                    }
                }
                None => {
                    debug!("Session closed the link");
                    if let Ok(close) = serde_json::to_string(&RecognizerControl::CloseStream) {
                        let _ = ws_sink.send(Message::text(close)).await;
                    }
                    let _ = ws_sink.close().await;
                    break;
                }
            },

            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if peer.messages.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Recognizer closed the connection: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Recognizer connection error: {}", e);
                    break;
                }
                None => {
                    info!("Recognizer stream ended");
                    break;
                }
            },
        }
    }

    peer.set_writable(false);
}
