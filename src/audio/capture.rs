use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::chunk::{AudioChunk, Chunker};
use super::source::{AudioFormat, MediaSource, MediaStream};
use crate::{Error, Result};

/// Owns an acquired media stream and the chunk timer driving it
///
/// The chunk sequence is lazy and cannot be restarted: once `stop` is called,
/// or the device goes away, a new capture session must be opened.
pub struct CaptureSession {
    source_name: String,
    format: AudioFormat,
    /// Stream waiting for `start`
    stream: Option<MediaStream>,
    /// Chunk timer task and its stop signal
    timer: Option<(JoinHandle<()>, oneshot::Sender<()>)>,
    started: bool,
    capturing: Arc<AtomicBool>,
}

impl CaptureSession {
    /// Acquire `source`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Media`] if the device cannot be acquired
    pub async fn open(source: &dyn MediaSource, format: AudioFormat) -> Result<Self> {
        info!("Acquiring media source: {}", source.name());

        let stream = source.acquire().await.map_err(|e| match e {
            Error::Media(_) => e,
            other => Error::Media(other.to_string()),
        })?;

        Ok(Self {
            source_name: source.name().to_string(),
            format,
            stream: Some(stream),
            timer: None,
            started: false,
            capturing: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start the chunk timer
    ///
    /// Returns the receiving end of the chunk sequence. A chunk is emitted on
    /// every tick that had audio; the sequence ends on `stop` or when the
    /// device goes away.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the session was already started or the
    /// interval is zero
    pub fn start(&mut self, interval: Duration) -> Result<mpsc::Receiver<AudioChunk>> {
        if interval.is_zero() {
            return Err(Error::Session(
                "chunk interval must be greater than zero".to_string(),
            ));
        }
        if self.started {
            return Err(Error::Session(format!(
                "capture on {} cannot be restarted",
                self.source_name
            )));
        }
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| Error::Session("capture stream already released".to_string()))?;

        self.started = true;
        self.capturing.store(true, Ordering::SeqCst);

        let (chunk_tx, chunk_rx) = mpsc::channel(16);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let capturing = Arc::clone(&self.capturing);
        let mut chunker = Chunker::new(self.format);
        let source_name = self.source_name.clone();

        info!(
            "Capture started on {} ({}ms chunks)",
            source_name,
            interval.as_millis()
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    frame = stream.next_frame() => match frame {
                        Some(frame) => chunker.push(frame),
                        None => {
                            warn!("Media source {} ended", source_name);
                            if let Some(chunk) = chunker.flush() {
                                let _ = chunk_tx.try_send(chunk);
                            }
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if let Some(chunk) = chunker.flush() {
                            match chunk_tx.try_send(chunk) {
                                Ok(()) => {}
                                Err(mpsc::error::TrySendError::Full(chunk)) => {
                                    debug!(
                                        sequence = chunk.sequence,
                                        "Chunk queue full, dropping chunk"
                                    );
                                }
                                Err(mpsc::error::TrySendError::Closed(_)) => {
                                    debug!("Chunk receiver dropped");
                                    break;
                                }
                            }
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }

            capturing.store(false, Ordering::SeqCst);
            stream.release();
            info!(
                "Capture stopped on {} ({} chunks)",
                source_name,
                chunker.chunks_emitted()
            );
        });

        self.timer = Some((task, stop_tx));

        Ok(chunk_rx)
    }

    /// Stop the chunk timer and release the device
    pub async fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.release();
        }

        if let Some((task, stop_tx)) = self.timer.take() {
            let _ = stop_tx.send(());
            if let Err(e) = task.await {
                error!("Capture task panicked: {}", e);
            }
        }

        self.capturing.store(false, Ordering::SeqCst);
    }

    /// Whether the chunk timer is running
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }
}
