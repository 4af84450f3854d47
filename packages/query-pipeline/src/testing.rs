//! Testing utilities including a mock transport.
//!
//! Useful for testing API-backed modules without making real network calls.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{RequestError, RequestResult};
use crate::transport::{RawResponse, Transport};

/// A canned reply registered on the mock.
#[derive(Debug, Clone)]
enum MockReply {
    Response { status: u16, body: String },
    Error(RequestError),
}

/// Mock transport for testing.
///
/// Replies are matched by URL fragment in registration order; the first
/// fragment contained in the requested URL wins. Unmatched URLs fail with
/// `RequestError::Http`. Clones share state, so a test can keep a handle for
/// assertions after moving a clone into the code under test.
///
/// # Example
///
/// ```rust
/// use query_pipeline::testing::MockTransport;
///
/// let mock = MockTransport::new()
///     .with_json("/v20/api.json", 200, serde_json::json!({"Results": []}));
/// assert_eq!(mock.call_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    replies: Arc<RwLock<Vec<(String, MockReply)>>>,
    calls: Arc<RwLock<Vec<String>>>,
    delay: Option<Duration>,
}

impl MockTransport {
    /// Create a new empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with a JSON body for URLs containing `fragment`.
    pub fn with_json(self, fragment: &str, status: u16, body: serde_json::Value) -> Self {
        self.with_body(fragment, status, body.to_string())
    }

    /// Reply with a raw body for URLs containing `fragment`.
    pub fn with_body(self, fragment: &str, status: u16, body: impl Into<String>) -> Self {
        self.replies.write().unwrap().push((
            fragment.to_string(),
            MockReply::Response {
                status,
                body: body.into(),
            },
        ));
        self
    }

    /// Fail requests for URLs containing `fragment`.
    pub fn with_error(self, fragment: &str, error: RequestError) -> Self {
        self.replies
            .write()
            .unwrap()
            .push((fragment.to_string(), MockReply::Error(error)));
        self
    }

    /// Delay every reply, to keep requests in flight during concurrency tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of requests issued.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Get the URLs that were requested.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// Count requests whose URL contains `fragment`.
    pub fn calls_matching(&self, fragment: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|url| url.contains(fragment))
            .count()
    }

    fn reply_for(&self, url: &str) -> Option<MockReply> {
        self.replies
            .read()
            .unwrap()
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, reply)| reply.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> RequestResult<RawResponse> {
        self.calls.write().unwrap().push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.reply_for(url) {
            Some(MockReply::Response { status, body }) => Ok(RawResponse::new(status, body)),
            Some(MockReply::Error(error)) => Err(error),
            None => Err(RequestError::Http(format!("no mock reply for {}", url))),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
