//! Audio playback to speakers

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use super::decode::decode_audio;
use super::sink::AudioSink;
use crate::{Error, Result};

/// Plays replies on the default output device
pub struct SpeakerSink;

/// Raises the stop flag when the render future is dropped or finishes
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioSink for SpeakerSink {
    async fn render(
        &self,
        id: u64,
        audio: Arc<[u8]>,
        stop: oneshot::Receiver<()>,
    ) -> Result<()> {
        let stopped = Arc::new(AtomicBool::new(false));
        let guard = StopOnDrop(Arc::clone(&stopped));

        let flag = Arc::clone(&stopped);
        let playback = tokio::task::spawn_blocking(move || play_blocking(&audio, &flag));

        tokio::select! {
            result = playback => {
                result.map_err(|e| Error::Playback(format!("playback thread panicked: {e}")))??;
            }
            _ = stop => {
                tracing::debug!(id, "speaker playback interrupted");
            }
        }

        drop(guard);
        Ok(())
    }
}

fn play_blocking(audio: &[u8], stopped: &AtomicBool) -> Result<()> {
    let decoded = decode_audio(audio.to_vec())?;
    let mono = decoded.to_mono();

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device available".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| Error::Playback(e.to_string()))?;
    let config: cpal::StreamConfig = supported.config();
    let channels = usize::from(config.channels);
    let output_rate = config.sample_rate.0;

    // Nearest-sample resampling to the device rate
    let step = f64::from(decoded.sample_rate) / f64::from(output_rate);
    let total = (mono.len() as f64 / step) as usize;
    let samples = Arc::new(mono);
    let position = Arc::new(AtomicUsize::new(0));

    let cursor = Arc::clone(&position);
    let source = Arc::clone(&samples);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let pos = cursor.fetch_add(1, Ordering::SeqCst);
                    let index = (pos as f64 * step) as usize;
                    let sample = source.get(index).copied().unwrap_or(0.0);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Playback(e.to_string()))?;

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    while position.load(Ordering::SeqCst) < total && !stopped.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(20));
    }

    drop(stream);
    tracing::debug!(samples = total, "playback complete");

    Ok(())
}
