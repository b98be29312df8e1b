use async_trait::async_trait;
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::source::{AudioFrame, MediaSource, MediaStream};
use crate::{Error, Result};

/// Length of each frame handed to the capture session
const FRAME_DURATION_MS: u64 = 20;

/// A WAV recording loaded into memory
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// # Errors
    ///
    /// Returns [`Error::Media`] if the file is missing or not 16-bit PCM WAV
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .map_err(|e| Error::Media(format!("failed to open {}: {e}", path.display())))?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Media(format!("failed to read samples: {e}")))?;

        let duration_seconds =
            samples.len() as f64 / (f64::from(spec.sample_rate) * f64::from(spec.channels));

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into consecutive frames of `frame_ms` milliseconds
    #[must_use]
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame = (u64::from(self.sample_rate) * frame_ms / 1000) as usize
            * usize::from(self.channels);
        if per_frame == 0 {
            return Vec::new();
        }

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, samples)| AudioFrame {
                samples: samples.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Replays a WAV file as if it were a live microphone
pub struct WavFileSource {
    path: PathBuf,
    name: String,
}

impl WavFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("wav:{}", path.display());
        Self { path, name }
    }
}

#[async_trait]
impl MediaSource for WavFileSource {
    async fn acquire(&self) -> Result<MediaStream> {
        let path = self.path.clone();
        let file = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|e| Error::Media(format!("file reader panicked: {e}")))??;

        let frames = file.frames(FRAME_DURATION_MS);
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));
            for frame in frames {
                ticker.tick().await;
                if tx.send(frame).await.is_err() {
                    debug!("file source released before end of file");
                    return;
                }
            }
            debug!("file source reached end of file");
        });

        Ok(MediaStream::new(rx))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
