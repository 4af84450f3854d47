//! Shared fetch-cache-parse pipeline for API-backed recon modules.
//!
//! Every module that asks an external source about a lookup key goes through
//! the same three steps: issue one request, cache the raw response, and lazily
//! parse it into result items. This crate owns those mechanics so individual
//! modules only supply a URL builder and a parser.
//!
//! # Usage
//!
//! ```rust,ignore
//! use query_pipeline::{QueryPipeline, HttpTransport, Transport};
//! use futures::FutureExt;
//!
//! let pipeline = QueryPipeline::new();
//! let transport = Arc::new(HttpTransport::new()?);
//!
//! let results = pipeline
//!     .query("builtwith", "example.com", move |query| {
//!         let url = domains_url(query);
//!         async move { transport.get(&url).await }.boxed()
//!     }, &DomainsParser)
//!     .await;
//!
//! for domain in results {
//!     println!("{domain}");
//! }
//! ```
//!
//! # Modules
//!
//! - [`pipeline`] - Single-flight cache and failure isolation
//! - [`results`] - Parser contract and lazily drained results
//! - [`transport`] - Request capability (HTTP, rate limited)
//! - [`credentials`] - API key handling
//! - [`testing`] - Mock transport for tests

pub mod credentials;
pub mod error;
pub mod pipeline;
pub mod results;
pub mod testing;
pub mod transport;

// Re-export core types at crate root
pub use credentials::SecretString;
pub use error::{ParseError, RequestError, RequestResult};
pub use pipeline::{CacheKey, PipelineConfig, PipelineStats, QueryPipeline, RequestFuture};
pub use results::{Parsed, QueryResults, ResponseParser};
pub use transport::{HttpTransport, RateLimitedTransport, RawResponse, Transport, TransportExt};

// Re-export testing utilities
pub use testing::MockTransport;

// Re-export the cancellation token the pipeline is tied to
pub use tokio_util::sync::CancellationToken;
