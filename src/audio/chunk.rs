// Chunking of captured audio for the recognizer
//
// Frames arrive from the media source at whatever size the device produces.
// The chunker converts them to the recognizer's PCM layout and accumulates
// them until the chunk timer fires, at which point everything collected so
// far is handed out as one chunk.

use super::source::{AudioFormat, AudioFrame};

/// One timer interval of encoded audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Chunk number (0-indexed)
    pub sequence: u64,
    /// 16-bit little-endian PCM
    pub data: Vec<u8>,
    /// Timestamp of the first frame in this chunk
    pub start_ms: u64,
    /// Number of samples in this chunk
    pub sample_count: usize,
}

/// Accumulates frames between chunk timer ticks
pub struct Chunker {
    format: AudioFormat,
    pending: Vec<i16>,
    pending_start_ms: Option<u64>,
    next_sequence: u64,
}

impl Chunker {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            pending: Vec::new(),
            pending_start_ms: None,
            next_sequence: 0,
        }
    }

    /// Add a frame to the current chunk
    pub fn push(&mut self, frame: AudioFrame) {
        let frame = convert_frame(frame, self.format);
        if frame.samples.is_empty() {
            return;
        }
        self.pending_start_ms.get_or_insert(frame.timestamp_ms);
        self.pending.extend_from_slice(&frame.samples);
    }

    /// Close the current chunk; `None` if nothing arrived since the last one
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if self.pending.is_empty() {
            return None;
        }

        let samples = std::mem::take(&mut self.pending);
        let chunk = AudioChunk {
            sequence: self.next_sequence,
            data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            start_ms: self.pending_start_ms.take().unwrap_or_default(),
            sample_count: samples.len(),
        };
        self.next_sequence += 1;

        Some(chunk)
    }

    /// Chunks produced so far
    pub fn chunks_emitted(&self) -> u64 {
        self.next_sequence
    }
}

/// Downsample and downmix a frame to the target format
pub fn convert_frame(frame: AudioFrame, target: AudioFormat) -> AudioFrame {
    let mut converted = frame;

    if converted.channels != target.channels && target.channels == 1 {
        converted = to_mono(converted);
    }

    if converted.sample_rate != target.sample_rate {
        converted = downsample(converted, target.sample_rate);
    }

    converted
}

/// Downsample by decimation; upsampling is not supported
fn downsample(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    let ratio = frame.sample_rate / target_rate;
    if ratio <= 1 {
        return frame;
    }

    let channels = usize::from(frame.channels.max(1));
    let samples: Vec<i16> = frame
        .samples
        .chunks_exact(channels)
        .step_by(ratio as usize)
        .flatten()
        .copied()
        .collect();

    AudioFrame {
        samples,
        sample_rate: target_rate,
        ..frame
    }
}

/// Average interleaved channels into one
fn to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = usize::from(frame.channels);
    let samples = frame
        .samples
        .chunks_exact(channels)
        .map(|group| {
            let sum: i32 = group.iter().map(|&s| i32::from(s)).sum();
            (sum / channels as i32) as i16
        })
        .collect();

    AudioFrame {
        samples,
        channels: 1,
        ..frame
    }
}
