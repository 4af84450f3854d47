//! HTTP transport backed by reqwest.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{RawResponse, Transport};
use crate::error::{RequestError, RequestResult};

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport that issues plain GET requests.
///
/// Non-2xx responses are not errors here: their bodies are passed through so
/// the parse step can read the source's own error message.
///
/// # Example
///
/// ```rust,ignore
/// use query_pipeline::transport::{HttpTransport, Transport};
///
/// let transport = HttpTransport::new()?;
/// let raw = transport.get("https://api.builtwith.com/v20/api.json?KEY=...").await?;
/// ```
pub struct HttpTransport {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpTransport {
    /// Create a new HTTP transport with default settings.
    pub fn new() -> RequestResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> RequestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RequestError::from_reqwest)?;
        Ok(Self::with_client(client))
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            user_agent: concat!("recon/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Set a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> RequestResult<RawResponse> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                let error = RequestError::from_reqwest(e);
                debug!(error = %error, "HTTP request failed");
                error
            })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(RequestError::from_reqwest)?;

        debug!(status, bytes = body.len(), "HTTP fetch complete");
        Ok(RawResponse::new(status, body))
    }

    fn name(&self) -> &str {
        "http"
    }
}
