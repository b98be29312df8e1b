//! Speech provider credential retrieval
//!
//! The hosted function hands out a short-lived key for the speech provider on
//! its `auth` route. The key authenticates both the recognizer WebSocket and
//! the speak endpoint for the lifetime of one session.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{Error, Result};

/// Bearer credential for the speech provider
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw key, for request headers only
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Source of speech provider credentials
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    /// Fetch a credential in a single round trip
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the authority returns no usable key
    async fn fetch_credential(&self) -> Result<Credential>;
}

/// Body returned by the auth route
#[derive(Debug, Deserialize)]
struct AuthResponse {
    key: Option<String>,
    error: Option<String>,
}

/// Fetches credentials from the hosted function's auth route
pub struct HttpCredentialFetcher {
    client: reqwest::Client,
    url: Url,
}

impl HttpCredentialFetcher {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `function_url` is not a valid URL
    pub fn new(client: reqwest::Client, function_url: &str, route: &str) -> Result<Self> {
        let mut url = Url::parse(function_url)
            .map_err(|e| Error::Config(format!("invalid function url {function_url}: {e}")))?;
        url.query_pairs_mut().append_pair("route", route);

        Ok(Self { client, url })
    }
}

#[async_trait]
impl CredentialFetcher for HttpCredentialFetcher {
    async fn fetch_credential(&self) -> Result<Credential> {
        debug!(url = %self.url, "requesting speech credential");

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::Auth(e.to_string()))?;

        let status = response.status();
        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("unreadable auth response ({status}): {e}")))?;

        match body.key {
            Some(key) if !key.is_empty() => {
                info!("speech credential acquired");
                Ok(Credential::new(key))
            }
            _ => Err(Error::Auth(
                body.error.unwrap_or_else(|| "No API key returned".to_string()),
            )),
        }
    }
}
