//! Transcript filtering
//!
//! The recognizer can report several "final" results in quick succession for
//! overlapping speech segments. Only non-empty finals pass, and after one is
//! accepted the gate stays shut for [`DEBOUNCE_WINDOW`], measured from the
//! acceptance time.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::recognizer::RecognizerMessage;

/// Minimum quiet interval between two accepted transcripts
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(1500);

/// Sentiment assumed when the recognizer reports none
pub const NEUTRAL_SENTIMENT: &str = "neutral";

/// One parsed recognizer result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    pub sentiment: String,
    pub received_at: Instant,
}

impl TranscriptEvent {
    /// Parse a raw recognizer message; `None` if it is not a usable result
    pub fn parse(raw: &str, received_at: Instant) -> Option<Self> {
        let message: RecognizerMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring malformed recognizer message: {}", e);
                return None;
            }
        };

        let text = message.transcript()?.trim().to_string();
        let sentiment = message
            .sentiment()
            .unwrap_or(NEUTRAL_SENTIMENT)
            .to_string();

        Some(Self {
            text,
            is_final: message.is_final,
            sentiment,
            received_at,
        })
    }
}

/// Minimum-interval filter over accepted transcripts
#[derive(Debug, Clone)]
pub struct DebounceGate {
    window: Duration,
    last_accepted_at: Option<Instant>,
}

impl DebounceGate {
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted_at: None,
        }
    }

    /// Accept at `now` unless still inside the window of the last acceptance
    pub fn try_accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted_at {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_accepted_at = Some(now);
        true
    }

    pub const fn last_accepted_at(&self) -> Option<Instant> {
        self.last_accepted_at
    }
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

/// A transcript forwarded to the dialogue relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedTranscript {
    pub text: String,
    pub sentiment: String,
    pub accepted_at: Instant,
}

/// Filters inbound recognizer messages down to accepted transcripts
#[derive(Debug, Default)]
pub struct TranscriptConsumer {
    gate: DebounceGate,
}

impl TranscriptConsumer {
    pub const fn new(window: Duration) -> Self {
        Self {
            gate: DebounceGate::new(window),
        }
    }

    /// Handle one raw message received at `now`
    pub fn consume(&mut self, raw: &str, now: Instant) -> Option<AcceptedTranscript> {
        let event = TranscriptEvent::parse(raw, now)?;

        if !event.is_final || event.text.is_empty() {
            return None;
        }

        if !self.gate.try_accept(now) {
            debug!("Debounced final transcript: {}", event.text);
            return None;
        }

        Some(AcceptedTranscript {
            text: event.text,
            sentiment: event.sentiment,
            accepted_at: now,
        })
    }

    pub const fn gate(&self) -> &DebounceGate {
        &self.gate
    }
}
