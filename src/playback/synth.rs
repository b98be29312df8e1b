//! Text-to-speech synthesis

use async_trait::async_trait;
use url::Url;

use crate::auth::Credential;
use crate::config::SpeechConfig;
use crate::{Error, Result};

/// Converts reply text into playable audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` in one round trip
    ///
    /// # Errors
    ///
    /// Returns [`Error::Synthesis`] if the provider call fails
    async fn synthesize(&self, credential: &Credential, text: &str) -> Result<Vec<u8>>;
}

/// Deepgram speak endpoint
pub struct DeepgramSynthesizer {
    client: reqwest::Client,
    url: Url,
}

impl DeepgramSynthesizer {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the speak URL is invalid
    pub fn new(client: reqwest::Client, config: &SpeechConfig) -> Result<Self> {
        let mut url = Url::parse(&config.speak_url)
            .map_err(|e| Error::Config(format!("invalid speak url: {e}")))?;
        url.query_pairs_mut().append_pair("model", &config.voice);

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Synthesizer for DeepgramSynthesizer {
    async fn synthesize(&self, credential: &Credential, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeakRequest<'a> {
            text: &'a str,
        }

        let response = self
            .client
            .post(self.url.clone())
            .header("Authorization", format!("Token {}", credential.expose()))
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("speak error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        if audio.is_empty() {
            return Err(Error::Synthesis("empty audio body".to_string()));
        }

        tracing::debug!(bytes = audio.len(), "reply synthesized");
        Ok(audio.to_vec())
    }
}
