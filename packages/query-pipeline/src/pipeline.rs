//! The query pipeline: request once, cache, parse lazily.
//!
//! # Guarantees
//!
//! - **Single flight**: at most one in-flight request per [`CacheKey`];
//!   concurrent callers for the same key await the same request
//! - **Cached**: completed responses are reused until `cache_ttl` elapses
//! - **Isolated**: request and parse failures are logged and turn into an
//!   empty result set, they never escape `query()`
//! - **Cancellable**: cancelling the pipeline's token aborts in-flight
//!   requests; aborted entries are evicted, never served

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{RequestError, RequestResult};
use crate::results::{QueryResults, ResponseParser};
use crate::transport::RawResponse;

/// Default cache horizon.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Future returned by a request step.
pub type RequestFuture = BoxFuture<'static, RequestResult<RawResponse>>;

type SharedResponse = Shared<BoxFuture<'static, RequestResult<Arc<RawResponse>>>>;

/// Identity of a cached query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Module issuing the query
    pub module: String,

    /// Lookup key sent to the source
    pub query: String,

    /// Result shape requested (see [`ResponseParser::variant`])
    pub variant: &'static str,
}

impl CacheKey {
    /// Create a new cache key.
    pub fn new(module: impl Into<String>, query: impl Into<String>, variant: &'static str) -> Self {
        Self {
            module: module.into(),
            query: query.into(),
            variant,
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long a completed response is reused
    pub cache_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl PipelineConfig {
    /// Set the cache horizon.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

/// Counters describing pipeline activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Request steps actually started
    pub requests: u64,

    /// Lookups served by an existing entry (in flight or completed)
    pub cache_hits: u64,

    /// Queries that ended in a request or parse failure
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

struct CacheEntry {
    response: SharedResponse,
    generation: u64,
    created_at: Instant,
}

impl CacheEntry {
    /// In-flight entries never expire; late arrivals keep joining them.
    fn is_expired(&self, ttl: Duration) -> bool {
        self.response.peek().is_some() && self.created_at.elapsed() > ttl
    }
}

/// Shared fetch-cache-parse mechanism for API-backed modules.
///
/// One pipeline is shared by every module in a scan (wrap it in an `Arc`).
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = QueryPipeline::new();
/// let transport = transport.clone();
/// let url = format!("{}/v20/api.json?KEY={}&LOOKUP={}", base, key, query);
///
/// let subdomains = pipeline
///     .query("builtwith", &query, move |_| async move { transport.get(&url).await }.boxed(), &DomainsParser)
///     .await;
///
/// for subdomain in subdomains {
///     // ...
/// }
/// ```
pub struct QueryPipeline {
    entries: DashMap<CacheKey, CacheEntry>,
    config: PipelineConfig,
    cancel: CancellationToken,
    next_generation: AtomicU64,
    counters: Counters,
}

impl Default for QueryPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryPipeline {
    /// Create a pipeline with default configuration.
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// Create a pipeline with custom configuration.
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            cancel: CancellationToken::new(),
            next_generation: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Tie the pipeline to a scan-wide cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The token that aborts this pipeline's requests.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Issue (or join, or reuse) a query and parse its response.
    ///
    /// `request_fn` is only invoked when no usable entry exists for
    /// `(module, query, parser.variant())`. It must build a lazy future that
    /// performs exactly one network call when polled; a future that loses a
    /// race for the key is dropped without being polled.
    ///
    /// Never fails: transport errors, cancellation and malformed bodies are
    /// logged and yield empty results.
    pub async fn query<P, F>(
        &self,
        module: &str,
        query: &str,
        request_fn: F,
        parser: &P,
    ) -> QueryResults<P::Item>
    where
        P: ResponseParser,
        F: FnOnce(&str) -> RequestFuture,
    {
        if self.cancel.is_cancelled() {
            debug!(module, query, "pipeline cancelled, skipping query");
            return QueryResults::empty(module, query);
        }

        let key = CacheKey::new(module, query, parser.variant());
        let (response, generation) = self.lookup_or_request(&key, request_fn);

        let raw = match response.await {
            Ok(raw) => raw,
            Err(RequestError::Cancelled) => {
                self.fail(&key, generation);
                debug!(module, query, variant = key.variant, "request cancelled");
                return QueryResults::empty(module, query);
            }
            Err(error) => {
                self.fail(&key, generation);
                warn!(module, query, variant = key.variant, error = %error, "request failed");
                return QueryResults::empty(module, query);
            }
        };

        match parser.parse(&raw, query) {
            Ok(parsed) => QueryResults::new(module, query, parsed),
            Err(error) => {
                self.fail(&key, generation);
                warn!(
                    module,
                    query,
                    variant = key.variant,
                    status = raw.status,
                    error = %error,
                    "failed to parse response"
                );
                QueryResults::empty(module, query)
            }
        }
    }

    /// Drop a cached entry, forcing the next query for it to re-request.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop all cached entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached entries (in flight or completed).
    pub fn cached_entries(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of activity counters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Find a usable entry or start a new request, atomically per key.
    ///
    /// `request_fn` runs with no map guard held, so it may call back into
    /// the pipeline. If another caller starts the same key in the meantime,
    /// the built future is dropped unpolled and the caller joins theirs.
    fn lookup_or_request<F>(&self, key: &CacheKey, request_fn: F) -> (SharedResponse, u64)
    where
        F: FnOnce(&str) -> RequestFuture,
    {
        if let Some(handle) = self.fresh_entry(key) {
            return handle;
        }

        self.sweep_expired();
        let request = request_fn(&key.query);

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(self.config.cache_ttl) {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    trace!(module = %key.module, query = %key.query, variant = key.variant, "joined concurrent request");
                    let entry = occupied.get();
                    return (entry.response.clone(), entry.generation);
                }

                let entry = self.start_request(key, request);
                let handle = (entry.response.clone(), entry.generation);
                occupied.insert(entry);
                handle
            }
            Entry::Vacant(vacant) => {
                let entry = self.start_request(key, request);
                let handle = (entry.response.clone(), entry.generation);
                vacant.insert(entry);
                handle
            }
        }
    }

    fn fresh_entry(&self, key: &CacheKey) -> Option<(SharedResponse, u64)> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(self.config.cache_ttl) {
            trace!(module = %key.module, query = %key.query, variant = key.variant, "cache entry expired");
            return None;
        }

        self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        trace!(module = %key.module, query = %key.query, variant = key.variant, "cache hit");
        Some((entry.response.clone(), entry.generation))
    }

    /// Drop every completed entry past the cache horizon.
    ///
    /// Runs on each cache miss, which already costs a network request.
    fn sweep_expired(&self) {
        let ttl = self.config.cache_ttl;
        self.entries.retain(|_, entry| !entry.is_expired(ttl));
    }

    fn start_request(&self, key: &CacheKey, request: RequestFuture) -> CacheEntry {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        debug!(module = %key.module, query = %key.query, variant = key.variant, "issuing request");

        let cancel = self.cancel.clone();
        let response = async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(RequestError::Cancelled),
                result = request => result.map(Arc::new),
            }
        }
        .boxed()
        .shared();

        CacheEntry {
            response,
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            created_at: Instant::now(),
        }
    }

    /// Record a failure and evict the entry unless it was already replaced.
    fn fail(&self, key: &CacheKey, generation: u64) {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        self.entries
            .remove_if(key, |_, entry| entry.generation == generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::results::Parsed;
    use crate::testing::MockTransport;
    use crate::transport::Transport;

    /// Parses `{"items": [...], "error": "..."}`.
    struct ItemsParser;

    #[derive(serde::Deserialize)]
    struct ItemsBody {
        #[serde(default)]
        items: Vec<String>,
        error: Option<String>,
    }

    impl ResponseParser for ItemsParser {
        type Item = String;

        fn variant(&self) -> &'static str {
            "items"
        }

        fn parse(&self, raw: &RawResponse, _query: &str) -> Result<Parsed<String>, ParseError> {
            let body: ItemsBody = raw.json()?;
            Ok(Parsed::new(body.items.into_iter()).with_source_error(body.error))
        }
    }

    /// Same body, different shape: counts items.
    struct CountParser;

    impl ResponseParser for CountParser {
        type Item = usize;

        fn variant(&self) -> &'static str {
            "count"
        }

        fn parse(&self, raw: &RawResponse, _query: &str) -> Result<Parsed<usize>, ParseError> {
            let body: ItemsBody = raw.json()?;
            Ok(Parsed::new(std::iter::once(body.items.len())))
        }
    }

    fn request(mock: &MockTransport, url: &str) -> impl FnOnce(&str) -> RequestFuture {
        let mock = mock.clone();
        let url = url.to_string();
        move |_| async move { mock.get(&url).await }.boxed()
    }

    fn items_mock() -> MockTransport {
        MockTransport::new().with_json(
            "/items",
            200,
            serde_json::json!({"items": ["a.example.com", "b.example.com"]}),
        )
    }

    #[tokio::test]
    async fn test_query_parses_items() {
        let mock = items_mock();
        let pipeline = QueryPipeline::new();

        let results = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;

        assert_eq!(
            results.collect::<Vec<_>>(),
            vec!["a.example.com".to_string(), "b.example.com".to_string()]
        );
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_sequential_queries_hit_cache() {
        let mock = items_mock();
        let pipeline = QueryPipeline::new();

        let first: Vec<_> = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await
            .collect();
        let second: Vec<_> = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await
            .collect();

        // Re-parsing the cached response yields the same sequence
        assert_eq!(first, second);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(pipeline.stats().requests, 1);
        assert_eq!(pipeline.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_concurrent_queries_share_one_request() {
        let mock = items_mock().with_delay(Duration::from_millis(50));
        let pipeline = QueryPipeline::new();

        let (first, second) = tokio::join!(
            pipeline.query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser),
            pipeline.query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser),
        );

        assert_eq!(mock.call_count(), 1);
        assert_eq!(first.collect::<Vec<_>>(), second.collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_key_includes_module_and_variant() {
        let mock = items_mock();
        let pipeline = QueryPipeline::new();

        let _ = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;
        let counts: Vec<_> = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &CountParser)
            .await
            .collect();
        let _ = pipeline
            .query("other", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;

        assert_eq!(counts, vec![2]);
        assert_eq!(mock.call_count(), 3);
        assert_eq!(pipeline.cached_entries(), 3);
    }

    #[tokio::test]
    async fn test_request_failure_yields_empty_and_evicts() {
        let mock = MockTransport::new().with_error("/items", RequestError::Timeout);
        let pipeline = QueryPipeline::new();

        let mut results = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;
        assert!(results.next().is_none());
        assert_eq!(pipeline.cached_entries(), 0);
        assert_eq!(pipeline.stats().failures, 1);

        // A later query retries instead of serving the failure
        let _ = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_body_yields_empty() {
        let mock = MockTransport::new().with_body("/items", 200, "");
        let pipeline = QueryPipeline::new();

        let results: Vec<_> = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await
            .collect();

        assert!(results.is_empty());
        assert_eq!(pipeline.stats().failures, 1);
        assert_eq!(pipeline.cached_entries(), 0);
    }

    #[tokio::test]
    async fn test_source_error_is_not_a_failure() {
        let mock = MockTransport::new().with_json(
            "/items",
            200,
            serde_json::json!({"items": [], "error": "No data for this domain"}),
        );
        let pipeline = QueryPipeline::new();

        let mut results = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;

        assert!(results.next().is_none());
        assert_eq!(results.no_results_reason(), Some("No data for this domain"));
        assert_eq!(pipeline.stats().failures, 0);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let mock = items_mock();
        let pipeline =
            QueryPipeline::with_config(PipelineConfig::default().with_cache_ttl(Duration::ZERO));

        let _ = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _ = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;

        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_expired_entries_are_swept() {
        let mock = items_mock();
        let pipeline = QueryPipeline::with_config(
            PipelineConfig::default().with_cache_ttl(Duration::from_millis(20)),
        );

        for query in ["a.example.com", "b.example.com"] {
            let _ = pipeline
                .query("mod", query, request(&mock, "https://src/items"), &ItemsParser)
                .await;
        }
        assert_eq!(pipeline.cached_entries(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let _ = pipeline
            .query("mod", "c.example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;

        assert_eq!(pipeline.cached_entries(), 1);
    }

    #[tokio::test]
    async fn test_request_builder_may_inspect_pipeline() {
        let mock = items_mock();
        let pipeline = QueryPipeline::new();
        let _ = pipeline
            .query("mod", "a.example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;

        let mut entries_seen = None;
        let build = request(&mock, "https://src/items");
        let results = pipeline
            .query(
                "mod",
                "b.example.com",
                |query| {
                    entries_seen = Some(pipeline.cached_entries());
                    build(query)
                },
                &ItemsParser,
            )
            .await;

        assert_eq!(results.count(), 2);
        assert_eq!(entries_seen, Some(1));
        assert_eq!(pipeline.cached_entries(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_request() {
        let mock = items_mock().with_delay(Duration::from_secs(30));
        let pipeline = QueryPipeline::new();
        let token = pipeline.cancellation_token();

        let query = pipeline.query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        };
        let (results, _) = tokio::join!(query, cancel);

        assert_eq!(results.count(), 0);
        assert_eq!(pipeline.cached_entries(), 0);

        // Once cancelled, no new requests are issued
        let _ = pipeline
            .query("mod", "other.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_request() {
        let mock = items_mock();
        let pipeline = QueryPipeline::new();

        let _ = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;
        assert!(pipeline.invalidate(&CacheKey::new("mod", "example.com", "items")));
        let _ = pipeline
            .query("mod", "example.com", request(&mock, "https://src/items"), &ItemsParser)
            .await;

        assert_eq!(mock.call_count(), 2);
        pipeline.clear();
        assert_eq!(pipeline.cached_entries(), 0);
    }
}
