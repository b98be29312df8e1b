use serde::{Deserialize, Serialize};

/// Streaming result sent by the recognizer
///
/// Only the fields the session reads are modelled; everything else in the
/// provider's payload is ignored.
#[derive(Debug, Deserialize)]
pub struct RecognizerMessage {
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub channel: Option<RecognizerChannel>,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
    /// Sentiment label, when reported per message
    pub sentiment: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct RecognizerChannel {
    #[serde(default)]
    pub alternatives: Vec<RecognizerAlternative>,
}

#[derive(Debug, Deserialize)]
pub struct RecognizerAlternative {
    #[serde(default)]
    pub transcript: String,
    pub confidence: Option<f32>,
    /// Sentiment label, when reported per alternative
    pub sentiment: Option<serde_json::Value>,
}

impl RecognizerMessage {
    /// First alternative's transcript, if any
    pub fn transcript(&self) -> Option<&str> {
        self.channel
            .as_ref()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.as_str())
    }

    /// Sentiment label, alternative first, then message level
    pub fn sentiment(&self) -> Option<&str> {
        self.channel
            .as_ref()
            .and_then(|c| c.alternatives.first())
            .and_then(|a| a.sentiment.as_ref())
            .and_then(serde_json::Value::as_str)
            .or_else(|| self.sentiment.as_ref().and_then(serde_json::Value::as_str))
    }
}

/// Control messages understood by the recognizer
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum RecognizerControl {
    /// Flush pending audio and close the stream
    CloseStream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_message() {
        let json = r#"{
            "type": "Results",
            "channel_index": [0, 1],
            "duration": 1.2,
            "start": 0.0,
            "is_final": true,
            "speech_final": true,
            "channel": {
                "alternatives": [
                    { "transcript": "turn on the lights", "confidence": 0.98, "sentiment": "positive" }
                ]
            }
        }"#;

        let msg: RecognizerMessage = serde_json::from_str(json).unwrap();
        assert!(msg.is_final);
        assert_eq!(msg.transcript(), Some("turn on the lights"));
        assert_eq!(msg.sentiment(), Some("positive"));
    }

    #[test]
    fn test_metadata_message_has_no_transcript() {
        let json = r#"{ "type": "Metadata", "request_id": "abc", "duration": 0.5 }"#;

        let msg: RecognizerMessage = serde_json::from_str(json).unwrap();
        assert!(!msg.is_final);
        assert_eq!(msg.transcript(), None);
        assert_eq!(msg.sentiment(), None);
    }

    #[test]
    fn test_non_string_sentiment_is_ignored() {
        let json = r#"{
            "is_final": true,
            "sentiment": "negative",
            "channel": { "alternatives": [ { "transcript": "hi", "sentiment": { "score": 0.2 } } ] }
        }"#;

        let msg: RecognizerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sentiment(), Some("negative"));
    }

    #[test]
    fn test_close_stream_control() {
        let json = serde_json::to_string(&RecognizerControl::CloseStream).unwrap();
        assert_eq!(json, r#"{"type":"CloseStream"}"#);
    }
}
