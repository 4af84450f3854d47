//! Rate-limited transport wrapper.
//!
//! Wraps any Transport implementation with rate limiting using the governor crate.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use super::{RawResponse, Transport};
use crate::error::RequestResult;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A transport wrapper that enforces a request rate toward a source.
pub struct RateLimitedTransport<T: Transport> {
    inner: T,
    limiter: Arc<DefaultRateLimiter>,
}

impl<T: Transport> RateLimitedTransport<T> {
    /// Create a new rate-limited transport.
    ///
    /// A rate of zero is clamped to one request per second.
    pub fn new(transport: T, requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self::with_quota(transport, Quota::per_second(rate))
    }

    /// Create with a custom quota.
    pub fn with_quota(transport: T, quota: Quota) -> Self {
        Self {
            inner: transport,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for RateLimitedTransport<T> {
    async fn get(&self, url: &str) -> RequestResult<RawResponse> {
        self.limiter.until_ready().await;
        self.inner.get(url).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Extension trait for easy rate limiting.
pub trait TransportExt: Transport + Sized {
    /// Wrap this transport with rate limiting.
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedTransport<Self> {
        RateLimitedTransport::new(self, requests_per_second)
    }
}

impl<T: Transport + Sized> TransportExt for T {}
