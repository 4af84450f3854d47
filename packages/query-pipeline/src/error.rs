//! Typed errors for the query pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Both error kinds are
//! absorbed at the pipeline boundary: they are logged and the query yields no
//! results, they never abort the calling module.

use thiserror::Error;

/// Errors raised by a request step.
///
/// `Clone` because one in-flight request may be awaited by several callers
/// that all observe the same outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    /// HTTP transport failed (connection refused, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The request did not complete in time
    #[error("request timed out")]
    Timeout,

    /// The scan was cancelled while the request was in flight
    #[error("request cancelled")]
    Cancelled,

    /// A request URL could not be assembled
    #[error("invalid URL: {reason}")]
    InvalidUrl { reason: String },
}

impl RequestError {
    /// Convert a reqwest error without leaking the URL (it carries API keys).
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(error.without_url().to_string())
        }
    }
}

impl From<url::ParseError> for RequestError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidUrl {
            reason: error.to_string(),
        }
    }
}

/// Errors raised while parsing a raw response.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Body was empty where a JSON document was expected
    #[error("empty response body")]
    EmptyBody,

    /// Body was not the JSON shape the parser expects
    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Result type alias for request steps.
pub type RequestResult<T> = std::result::Result<T, RequestError>;
