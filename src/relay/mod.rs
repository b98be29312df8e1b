//! Dialogue relay to the hosted inference function

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{Error, Result};

/// Sends a finalized transcript to the assistant and returns its reply
#[async_trait]
pub trait DialogueRelay: Send + Sync {
    /// One request/response exchange
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inference`] if the call fails or yields no reply
    async fn ask(&self, text: &str, sentiment: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    text: &'a str,
    sentiment: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: Option<String>,
    error: Option<String>,
}

/// Posts transcripts to the hosted function's default (chat) route
pub struct HttpDialogueRelay {
    client: reqwest::Client,
    url: Url,
}

impl HttpDialogueRelay {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `function_url` is not a valid URL
    pub fn new(client: reqwest::Client, function_url: &str) -> Result<Self> {
        let url = Url::parse(function_url)
            .map_err(|e| Error::Config(format!("invalid function url {function_url}: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl DialogueRelay for HttpDialogueRelay {
    async fn ask(&self, text: &str, sentiment: &str) -> Result<String> {
        debug!(sentiment, "relaying transcript: {}", text);

        let response = self
            .client
            .post(self.url.clone())
            .json(&ChatRequest { text, sentiment })
            .send()
            .await
            .map_err(|e| Error::Inference(e.to_string()))?;

        let status = response.status();
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("unreadable reply ({status}): {e}")))?;

        if let Some(error) = body.error {
            return Err(Error::Inference(error));
        }
        if !status.is_success() {
            return Err(Error::Inference(format!("inference endpoint returned {status}")));
        }

        body.response
            .ok_or_else(|| Error::Inference("reply missing `response`".to_string()))
    }
}
