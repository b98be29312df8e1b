//! Audio capture from the default input device

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use std::time::Instant;
use tokio::sync::mpsc;

use super::source::{AudioFormat, AudioFrame, MediaSource, MediaStream};
use crate::{Error, Result};

/// Captures audio from the default input device
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread that
/// holds it until the media stream is released.
pub struct MicrophoneSource {
    format: AudioFormat,
}

impl MicrophoneSource {
    pub const fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl MediaSource for MicrophoneSource {
    async fn acquire(&self) -> Result<MediaStream> {
        let (frame_tx, frame_rx) = mpsc::channel::<AudioFrame>(64);
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        std::thread::spawn(move || {
            let stream = match open_input_stream(frame_tx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            // Blocks until the media stream is released
            let _ = stop_rx.recv();
            drop(stream);
            tracing::debug!("microphone released");
        });

        tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| Error::Media(e.to_string()))?
            .map_err(|_| Error::Media("microphone thread exited".to_string()))??;

        tracing::debug!(
            target_rate = self.format.sample_rate,
            "microphone acquired"
        );

        Ok(MediaStream::with_release(frame_rx, move || {
            let _ = stop_tx.send(());
        }))
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn open_input_stream(frame_tx: mpsc::Sender<AudioFrame>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Media("no input device available".to_string()))?;

    let supported = device
        .default_input_config()
        .map_err(|e| Error::Media(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config: cpal::StreamConfig = supported.config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "audio capture initialized"
    );

    let started = Instant::now();
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let samples = data
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
                    .collect();
                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                // Real-time feed: a full queue drops the frame
                let _ = frame_tx.try_send(frame);
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Media(e.to_string()))?;

    stream.play().map_err(|e| Error::Media(e.to_string()))?;

    Ok(stream)
}
