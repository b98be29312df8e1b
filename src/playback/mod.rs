//! Reply synthesis and single-speaker playback

pub mod coordinator;
pub mod decode;
pub mod sink;
pub mod synth;

#[cfg(feature = "device-audio")]
pub mod speaker;

pub use coordinator::{PlaybackCoordinator, PlaybackEvent, SpeakOutcome};
pub use decode::{decode_audio, DecodedAudio};
pub use sink::{AudioSink, FileSink, PlaybackHandle};
pub use synth::{DeepgramSynthesizer, Synthesizer};

#[cfg(feature = "device-audio")]
pub use speaker::SpeakerSink;
