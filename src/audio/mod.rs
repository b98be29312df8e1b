pub mod capture;
pub mod chunk;
pub mod file;
pub mod source;

#[cfg(feature = "device-audio")]
pub mod microphone;

pub use capture::CaptureSession;
pub use chunk::{AudioChunk, Chunker};
pub use file::{AudioFile, WavFileSource};
pub use source::{AudioFormat, AudioFrame, MediaSource, MediaSourceFactory, MediaStream, SourceKind};
