//! Shared plumbing for modules backed by a keyed HTTP API.
//!
//! [`ApiSource`] bundles what every such module needs: a base URL, an
//! optional API key, the transport and the shared query pipeline. Modules
//! compose one instead of re-implementing request building, pinging and
//! credential checks.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use query_pipeline::{
    HttpTransport, PipelineConfig, QueryPipeline, QueryResults, RequestError, RequestResult,
    ResponseParser, SecretString, Transport, TransportExt,
};
use recon_core::{ModuleError, ModuleResult, ScanSettings, SetupOutcome};
use tracing::debug;
use url::Url;

/// Capabilities shared by every API-backed module in a scan.
#[derive(Clone)]
pub struct SourceDeps {
    pub transport: Arc<dyn Transport>,
    pub pipeline: Arc<QueryPipeline>,
}

impl SourceDeps {
    pub fn new(transport: Arc<dyn Transport>, pipeline: Arc<QueryPipeline>) -> Self {
        Self {
            transport,
            pipeline,
        }
    }

    /// Real HTTP transport and a pipeline configured from scan settings.
    pub fn from_settings(settings: &ScanSettings) -> RequestResult<Self> {
        let http = HttpTransport::with_timeout(Duration::from_secs(settings.http_timeout_secs))?;
        let transport: Arc<dyn Transport> = match settings.requests_per_second {
            Some(rps) => Arc::new(http.rate_limited(rps)),
            None => Arc::new(http),
        };
        let pipeline = QueryPipeline::with_config(
            PipelineConfig::default().with_cache_ttl(Duration::from_secs(settings.cache_ttl_secs)),
        );
        Ok(Self::new(transport, Arc::new(pipeline)))
    }
}

impl std::fmt::Debug for SourceDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDeps")
            .field("transport", &self.transport.name())
            .finish_non_exhaustive()
    }
}

/// A keyed HTTP data source.
pub struct ApiSource {
    name: &'static str,
    base_url: &'static str,
    key_param: &'static str,
    api_key: Option<SecretString>,
    ping_path: Option<&'static str>,
    deps: SourceDeps,
}

impl ApiSource {
    /// `key_param` is the query parameter carrying the API key.
    ///
    /// Pings request the base URL until [`with_ping_path`](Self::with_ping_path)
    /// or [`without_ping`](Self::without_ping) says otherwise.
    pub fn new(
        name: &'static str,
        base_url: &'static str,
        key_param: &'static str,
        deps: SourceDeps,
    ) -> Self {
        Self {
            name,
            base_url,
            key_param,
            api_key: None,
            ping_path: Some("/"),
            deps,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Ping against a cheaper endpoint than the base URL.
    pub fn with_ping_path(mut self, path: &'static str) -> Self {
        self.ping_path = Some(path);
        self
    }

    /// Sources that bill every request are never pinged.
    pub fn without_ping(mut self) -> Self {
        self.ping_path = None;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Setup verdict for an auth-required source.
    pub fn require_api_key(&self) -> SetupOutcome {
        if self.has_api_key() {
            SetupOutcome::Ready
        } else {
            SetupOutcome::skip("missing api_key")
        }
    }

    /// Build `{base_url}{path}?{key_param}={key}&{params...}`.
    pub fn url(&self, path: &str, params: &[(&str, &str)]) -> RequestResult<String> {
        let key = self.api_key.as_ref().ok_or_else(|| RequestError::InvalidUrl {
            reason: format!("no api key configured for {}", self.name),
        })?;

        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        url.query_pairs_mut()
            .append_pair(self.key_param, key.expose())
            .extend_pairs(params);
        Ok(url.into())
    }

    /// Run one query through the shared pipeline.
    ///
    /// `build_url` is only called when no cached or in-flight response
    /// exists for `(module, query, parser variant)`.
    pub async fn query<P, B>(&self, query: &str, build_url: B, parser: &P) -> QueryResults<P::Item>
    where
        P: ResponseParser,
        B: FnOnce(&str) -> RequestResult<String>,
    {
        let transport = self.deps.transport.clone();
        self.deps
            .pipeline
            .query(
                self.name,
                query,
                move |query| {
                    let url = build_url(query);
                    async move { transport.get(&url?).await }.boxed()
                },
                parser,
            )
            .await
    }

    /// Liveness and credential check against the ping path.
    ///
    /// Requires a success status.
    pub async fn ping(&self) -> ModuleResult<()> {
        let Some(path) = self.ping_path else {
            debug!(source = self.name, "ping disabled");
            return Ok(());
        };
        let url = self
            .url(path, &[])
            .map_err(|e| ModuleError::Source(e.to_string()))?;
        let response = self
            .deps
            .transport
            .get(&url)
            .await
            .map_err(|e| ModuleError::Source(format!("{} ping failed: {}", self.name, e)))?;

        if !response.is_success() {
            return Err(ModuleError::Source(format!(
                "{} ping returned status {}",
                self.name, response.status
            )));
        }

        debug!(source = self.name, "ping ok");
        Ok(())
    }
}

impl std::fmt::Debug for ApiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSource")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_pipeline::MockTransport;

    fn source(mock: &MockTransport, key: Option<&str>) -> ApiSource {
        let deps = SourceDeps::new(Arc::new(mock.clone()), Arc::new(QueryPipeline::new()));
        ApiSource::new("test_source", "https://api.source.test", "key", deps)
            .with_api_key(SecretString::from_config(key))
    }

    #[test]
    fn test_url_encodes_params() {
        let source = source(&MockTransport::new(), Some("k3y"));
        let url = source
            .url("/lookup", &[("LOOKUP", "a b.com"), ("NOMETA", "yes")])
            .unwrap();
        assert_eq!(
            url,
            "https://api.source.test/lookup?key=k3y&LOOKUP=a+b.com&NOMETA=yes"
        );
    }

    #[test]
    fn test_missing_key_skips_setup() {
        let source = source(&MockTransport::new(), None);
        assert!(!source.has_api_key());
        assert_eq!(source.require_api_key(), SetupOutcome::skip("missing api_key"));
        assert!(source.url("/lookup", &[]).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let source = source(&MockTransport::new(), Some("k3y"));
        assert!(!format!("{:?}", source).contains("k3y"));
    }

    #[tokio::test]
    async fn test_ping_requires_success_status() {
        let ok = MockTransport::new().with_json("/api-info", 200, serde_json::json!({}));
        let pinged = source(&ok, Some("k3y")).with_ping_path("/api-info");
        tokio_test::assert_ok!(pinged.ping().await);

        let unauthorized =
            MockTransport::new().with_json("/api-info", 401, serde_json::json!({"error": "bad key"}));
        let err = source(&unauthorized, Some("k3y"))
            .with_ping_path("/api-info")
            .ping()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_default_ping_requests_base_url() {
        let mock = MockTransport::new().with_json("api.source.test/?key=k3y", 200, serde_json::json!({}));
        tokio_test::assert_ok!(source(&mock, Some("k3y")).ping().await);
        assert_eq!(mock.calls_matching("api.source.test/?key=k3y"), 1);
    }

    #[tokio::test]
    async fn test_without_ping_sends_nothing() {
        let mock = MockTransport::new();
        tokio_test::assert_ok!(source(&mock, Some("k3y")).without_ping().ping().await);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_query_goes_through_pipeline() {
        struct Lines;
        impl ResponseParser for Lines {
            type Item = String;
            fn variant(&self) -> &'static str {
                "lines"
            }
            fn parse(
                &self,
                raw: &query_pipeline::RawResponse,
                _query: &str,
            ) -> Result<query_pipeline::Parsed<String>, query_pipeline::ParseError> {
                let text = raw.text();
                let lines: Vec<String> = text.lines().map(str::to_string).collect();
                Ok(query_pipeline::Parsed::new(lines.into_iter()))
            }
        }

        let mock = MockTransport::new().with_body("LOOKUP=example.com", 200, "a\nb");
        let source = source(&mock, Some("k3y"));

        for _ in 0..2 {
            let items: Vec<_> = source
                .query("example.com", |q| source.url("/lookup", &[("LOOKUP", q)]), &Lines)
                .await
                .collect();
            assert_eq!(items, vec!["a", "b"]);
        }
        assert_eq!(mock.call_count(), 1);
    }
}
