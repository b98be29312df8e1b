use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// PCM layout expected by the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// A live, non-restartable feed of frames from an acquired media source
///
/// Dropping or releasing the stream gives the device back.
pub struct MediaStream {
    frames: mpsc::Receiver<AudioFrame>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl MediaStream {
    pub fn new(frames: mpsc::Receiver<AudioFrame>) -> Self {
        Self {
            frames,
            release: None,
        }
    }

    /// Stream whose device is handed back by `release` when the stream ends
    pub fn with_release(
        frames: mpsc::Receiver<AudioFrame>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            frames,
            release: Some(Box::new(release)),
        }
    }

    /// Next frame, or `None` once the device is gone
    pub async fn next_frame(&mut self) -> Option<AudioFrame> {
        self.frames.recv().await
    }

    pub fn release(mut self) {
        self.frames.close();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Audio input device
///
/// Implementations:
/// - Microphone: default input device via cpal (`device-audio` feature)
/// - WAV file: replays a recording in real time (demos and tests)
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire the device and start producing frames
    ///
    /// # Errors
    ///
    /// Returns [`Error::Media`] if the device is unavailable
    async fn acquire(&self) -> Result<MediaStream>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Media source type
#[derive(Debug, Clone)]
pub enum SourceKind {
    /// Microphone input
    Microphone,
    /// File input (demos, tests)
    WavFile(PathBuf),
}

/// Media source factory
pub struct MediaSourceFactory;

impl MediaSourceFactory {
    /// Create the media source for `kind`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the microphone is requested without the
    /// `device-audio` feature
    pub fn create(kind: SourceKind, format: AudioFormat) -> Result<Arc<dyn MediaSource>> {
        match kind {
            SourceKind::Microphone => {
                #[cfg(feature = "device-audio")]
                {
                    Ok(Arc::new(super::microphone::MicrophoneSource::new(format)))
                }

                #[cfg(not(feature = "device-audio"))]
                {
                    let _ = format;
                    Err(Error::Config(
                        "microphone capture requires the `device-audio` feature".to_string(),
                    ))
                }
            }

            SourceKind::WavFile(path) => Ok(Arc::new(super::file::WavFileSource::new(path))),
        }
    }
}
