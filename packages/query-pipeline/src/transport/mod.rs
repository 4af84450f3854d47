//! Transport trait: the "request capability" API-backed modules build on.
//!
//! A transport performs exactly one network call per `get` and hands the
//! body back untouched, whatever its status. Deciding what a 4xx body means
//! is the parse step's job.
//!
//! # Available Transports
//!
//! - `HttpTransport` - reqwest-based HTTP client
//! - `RateLimitedTransport` - wrapper that spaces out requests
//! - `MockTransport` - canned responses for tests (see [`crate::testing`])

mod http;
mod rate_limited;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::error::{ParseError, RequestResult};

pub use http::HttpTransport;
pub use rate_limited::{RateLimitedTransport, TransportExt};

/// Raw response handed from a request step to a parse step.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,

    /// Unmodified response body
    pub body: Bytes,

    /// When the response was received
    pub fetched_at: DateTime<Utc>,
}

impl RawResponse {
    /// Create a new raw response.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    ///
    /// An empty body is an error rather than an implicit "no data".
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ParseError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::EmptyBody);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as lossy UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport trait for issuing requests against external sources.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET request to a fully-qualified URL.
    async fn get(&self, url: &str) -> RequestResult<RawResponse>;

    /// Get the transport name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}
