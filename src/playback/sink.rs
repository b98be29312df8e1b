use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::decode::{decode_audio, DecodedAudio};
use crate::{Error, Result};

/// Renders synthesized audio
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Render `audio` until it finishes or `stop` fires
    ///
    /// Returning `Ok` means playback ended (naturally or stopped); an error
    /// means it could not be rendered.
    async fn render(&self, id: u64, audio: Arc<[u8]>, stop: oneshot::Receiver<()>) -> Result<()>;
}

/// One in-flight rendering of a reply
pub struct PlaybackHandle {
    id: u64,
    source: Arc<[u8]>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    pub(crate) fn new(
        id: u64,
        source: Arc<[u8]>,
        stop_tx: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            source,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Audio being rendered
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn is_active(&self) -> bool {
        self.stop_tx.is_some() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop rendering immediately
    pub fn stop(&mut self) {
        let interrupted = self
            .stop_tx
            .take()
            .is_some_and(|stop_tx| stop_tx.send(()).is_ok());
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if interrupted {
            debug!(id = self.id, "playback stopped");
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Writes each reply to disk as WAV and holds it for its duration
///
/// Stands in for a speaker where no output device is available; the reply is
/// "playing" for exactly as long as it would be audible.
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    /// # Errors
    ///
    /// Returns an IO error if the output directory cannot be created
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;

        info!("Replies will be written to {}", output_dir.display());

        Ok(Self { output_dir })
    }

    /// Path the reply with `id` is written to
    pub fn reply_path(&self, id: u64) -> PathBuf {
        self.output_dir.join(format!("reply-{id:04}.wav"))
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn render(
        &self,
        id: u64,
        audio: Arc<[u8]>,
        mut stop: oneshot::Receiver<()>,
    ) -> Result<()> {
        let path = self.reply_path(id);
        let decoded = tokio::task::spawn_blocking(move || -> Result<DecodedAudio> {
            let decoded = decode_audio(audio.to_vec())?;
            write_wav(&path, &decoded)?;
            Ok(decoded)
        })
        .await
        .map_err(|e| Error::Playback(format!("reply writer panicked: {e}")))??;

        let duration = decoded.duration();
        debug!(id, ?duration, "reply playing");

        tokio::select! {
            () = tokio::time::sleep(duration) => debug!(id, "reply finished"),
            _ = &mut stop => debug!(id, "reply interrupted"),
        }

        Ok(())
    }
}

fn write_wav(path: &Path, audio: &DecodedAudio) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| Error::Playback(format!("failed to create {}: {e}", path.display())))?;
    for &sample in &audio.samples {
        let sample = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(sample)
            .map_err(|e| Error::Playback(format!("failed to write sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::Playback(format!("failed to finalize WAV: {e}")))?;

    Ok(())
}
