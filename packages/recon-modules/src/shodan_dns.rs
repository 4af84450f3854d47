//! Shodan DNS subdomain lookups.

use std::sync::Arc;

use async_trait::async_trait;
use query_pipeline::{ParseError, Parsed, RawResponse, RequestResult, ResponseParser, SecretString};
use recon_core::{
    empty_string_as_none, ConfigError, Emitter, Event, EventType, Module, ModuleFlag, ModuleMeta,
    ModuleResult, ScanConfig, SetupOutcome,
};
use serde::Deserialize;

use crate::dns::{make_query, normalize_dns_name};
use crate::source::{ApiSource, SourceDeps};

pub const NAME: &str = "shodan_dns";
const BASE_URL: &str = "https://api.shodan.io";

/// `modules.shodan_dns` config section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShodanDnsConfig {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DomainResponse {
    #[serde(default)]
    subdomains: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

/// Parses `/dns/domain/{query}` into `{subdomain}.{query}` names.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubdomainsParser;

impl ResponseParser for SubdomainsParser {
    type Item = String;

    fn variant(&self) -> &'static str {
        "subdomains"
    }

    fn parse(&self, raw: &RawResponse, query: &str) -> Result<Parsed<String>, ParseError> {
        let response: DomainResponse = raw.json()?;
        let query = query.to_string();

        let items = response
            .subdomains
            .unwrap_or_default()
            .into_iter()
            .filter(|sub| !sub.is_empty())
            .map(move |sub| format!("{}.{}", sub, query));

        Ok(Parsed::new(items).with_source_error(response.error))
    }
}

/// Queries Shodan's DNS database for subdomains.
#[derive(Debug)]
pub struct ShodanDns {
    meta: ModuleMeta,
    source: ApiSource,
}

impl ShodanDns {
    pub fn new(config: ShodanDnsConfig, deps: SourceDeps) -> Self {
        let source = ApiSource::new(NAME, BASE_URL, "key", deps)
            .with_ping_path("/api-info")
            .with_api_key(SecretString::from_config(config.api_key.as_deref()));
        Self {
            meta: Self::module_meta(),
            source,
        }
    }

    pub fn from_scan_config(scan: &ScanConfig, deps: SourceDeps) -> Result<Self, ConfigError> {
        Ok(Self::new(scan.module_config(NAME)?, deps))
    }

    pub fn module_meta() -> ModuleMeta {
        ModuleMeta::new(NAME)
            .watches(EventType::DNS_NAME)
            .produces(EventType::DNS_NAME)
            .flag(ModuleFlag::SubdomainEnum)
            .flag(ModuleFlag::Passive)
            .flag(ModuleFlag::Safe)
            .description("Query Shodan for subdomains")
            .auth_required()
            .option("api_key", serde_json::json!(""), "Shodan API key")
    }

    fn domain_url(&self, query: &str) -> RequestResult<String> {
        self.source.url(&format!("/dns/domain/{}", query), &[])
    }
}

#[async_trait]
impl Module for ShodanDns {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    async fn setup(&self) -> ModuleResult<SetupOutcome> {
        Ok(self.source.require_api_key())
    }

    async fn ping(&self) -> ModuleResult<()> {
        self.source.ping().await
    }

    async fn handle_event(&self, event: Arc<Event>, emitter: &Emitter) -> ModuleResult<()> {
        let query = make_query(&event);
        let current = normalize_dns_name(event.value());

        let subdomains = self
            .source
            .query(&query, |q| self.domain_url(q), &SubdomainsParser)
            .await;
        for subdomain in subdomains {
            let subdomain = normalize_dns_name(&subdomain);
            if subdomain == current {
                continue;
            }
            emitter.emit_event(subdomain, EventType::DNS_NAME, &event, &[])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_pipeline::{MockTransport, QueryPipeline};
    use recon_core::testing::{collect_values, dns_seed};
    use recon_core::EventQueue;
    use serde_json::json;

    fn module(mock: &MockTransport, key: Option<&str>) -> ShodanDns {
        let deps = SourceDeps::new(Arc::new(mock.clone()), Arc::new(QueryPipeline::new()));
        ShodanDns::new(
            ShodanDnsConfig {
                api_key: key.map(str::to_string),
            },
            deps,
        )
    }

    #[test]
    fn test_parser_joins_query() {
        let raw = RawResponse::new(
            200,
            serde_json::to_vec(&json!({"subdomains": ["www", "", "mail"]})).unwrap(),
        );
        let items: Vec<_> = SubdomainsParser
            .parse(&raw, "example.com")
            .unwrap()
            .into_items()
            .collect();
        assert_eq!(items, vec!["www.example.com", "mail.example.com"]);
    }

    #[tokio::test]
    async fn test_emits_subdomains() {
        let mock = MockTransport::new().with_json(
            "/dns/domain/example.com",
            200,
            json!({"subdomains": ["www", "api"]}),
        );
        let module = module(&mock, Some("k3y"));
        let (queue, mut receiver) = EventQueue::new();
        let emitter = Emitter::new(module.meta(), queue);

        module
            .handle_event(dns_seed("example.com"), &emitter)
            .await
            .unwrap();

        assert_eq!(
            collect_values(&mut receiver),
            vec!["www.example.com", "api.example.com"]
        );
    }

    #[tokio::test]
    async fn test_source_error_yields_nothing() {
        let mock = MockTransport::new().with_json(
            "/dns/domain/example.com",
            401,
            json!({"error": "Please upgrade your API plan"}),
        );
        let module = module(&mock, Some("k3y"));
        let (queue, mut receiver) = EventQueue::new();
        let emitter = Emitter::new(module.meta(), queue);

        module
            .handle_event(dns_seed("example.com"), &emitter)
            .await
            .unwrap();

        assert!(receiver.drain().is_empty());
    }

    #[tokio::test]
    async fn test_ping_uses_api_info() {
        let mock = MockTransport::new().with_json("/api-info", 200, json!({"plan": "dev"}));
        let module = module(&mock, Some("k3y"));

        module.ping().await.unwrap();
        assert_eq!(mock.calls_matching("/api-info?key=k3y"), 1);
    }

    #[tokio::test]
    async fn test_missing_key_skips() {
        let module = module(&MockTransport::new(), None);
        assert!(matches!(module.setup().await.unwrap(), SetupOutcome::Skip(_)));
    }
}
