//! Builtwith.com subdomain and redirect lookups.
//!
//! Two lookups per event, both through the shared query pipeline:
//!
//! - **domains**: FQDNs from the site's technology profile, in the order the
//!   API reports them
//! - **redirects** (optional): inbound and outbound redirect domains,
//!   deduplicated and tagged `affiliate`

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexSet;
use query_pipeline::{ParseError, Parsed, RawResponse, RequestResult, ResponseParser, SecretString};
use recon_core::{
    empty_string_as_none, ConfigError, Emitter, Event, EventType, Module, ModuleFlag, ModuleMeta,
    ModuleResult, ScanConfig, SetupOutcome,
};
use serde::Deserialize;
use tracing::debug;

use crate::dns::{make_query, normalize_dns_name};
use crate::source::{ApiSource, SourceDeps};

pub const NAME: &str = "builtwith";
const BASE_URL: &str = "https://api.builtwith.com";
const AFFILIATE_TAG: &str = "affiliate";

/// `modules.builtwith` config section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuiltWithConfig {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub redirects: Option<bool>,
}

impl BuiltWithConfig {
    /// Whether redirect lookups are enabled (default `true`).
    pub fn redirects(&self) -> bool {
        self.redirects.unwrap_or(true)
    }
}

// -- domains --------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DomainsResponse {
    #[serde(default)]
    results: Option<Vec<DomainsResult>>,
    #[serde(default)]
    errors: Option<Vec<ApiMessage>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DomainsResult {
    #[serde(default)]
    result: Option<ResultBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultBody {
    #[serde(default)]
    paths: Option<Vec<PathEntry>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PathEntry {
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    sub_domain: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiMessage {
    #[serde(default)]
    message: Option<String>,
}

impl PathEntry {
    fn fqdn(self) -> Option<String> {
        let domain = self.domain.filter(|d| !d.is_empty())?;
        match self.sub_domain.filter(|s| !s.is_empty()) {
            Some(sub) => Some(format!("{}.{}", sub, domain)),
            None => Some(domain),
        }
    }
}

/// Parses `/v20/api.json` into FQDNs, preserving API order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainsParser;

impl ResponseParser for DomainsParser {
    type Item = String;

    fn variant(&self) -> &'static str {
        "domains"
    }

    fn parse(&self, raw: &RawResponse, _query: &str) -> Result<Parsed<String>, ParseError> {
        let Some(response) = raw.json::<Option<DomainsResponse>>()? else {
            return Ok(Parsed::empty());
        };

        let error = response
            .errors
            .and_then(|errors| errors.into_iter().next())
            .unwrap_or_default()
            .message
            .unwrap_or_else(|| "Unknown Error".to_string());

        let items = response
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|result| result.result)
            .flat_map(|body| body.paths.unwrap_or_default())
            .filter_map(PathEntry::fqdn);

        Ok(Parsed::new(items).with_source_error(Some(error)))
    }
}

// -- redirects ------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RedirectsResponse {
    #[serde(default)]
    inbound: Option<Vec<RedirectEntry>>,
    #[serde(default)]
    outbound: Option<Vec<RedirectEntry>>,
    #[serde(default, rename = "error")]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RedirectEntry {
    #[serde(default)]
    domain: Option<String>,
}

/// Parses `/redirect1/api.json` into the set of redirect domains.
///
/// Inbound entries come first, then outbound; each domain appears once.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectsParser;

impl ResponseParser for RedirectsParser {
    type Item = String;

    fn variant(&self) -> &'static str {
        "redirects"
    }

    fn parse(&self, raw: &RawResponse, _query: &str) -> Result<Parsed<String>, ParseError> {
        let response: RedirectsResponse = raw.json()?;

        let domains: IndexSet<String> = response
            .inbound
            .unwrap_or_default()
            .into_iter()
            .chain(response.outbound.unwrap_or_default())
            .filter_map(|entry| entry.domain)
            .filter(|domain| !domain.is_empty())
            .collect();

        Ok(Parsed::new(domains.into_iter()).with_source_error(response.error))
    }
}

// -- module ---------------------------------------------------------------

/// Queries Builtwith for subdomains and, optionally, redirect affiliates.
#[derive(Debug)]
pub struct BuiltWith {
    meta: ModuleMeta,
    source: ApiSource,
    config: BuiltWithConfig,
}

impl BuiltWith {
    pub fn new(config: BuiltWithConfig, deps: SourceDeps) -> Self {
        // No free endpoint; pinging would spend API credits
        let source = ApiSource::new(NAME, BASE_URL, "KEY", deps)
            .without_ping()
            .with_api_key(SecretString::from_config(config.api_key.as_deref()));
        Self {
            meta: Self::module_meta(),
            source,
            config,
        }
    }

    pub fn from_scan_config(scan: &ScanConfig, deps: SourceDeps) -> Result<Self, ConfigError> {
        Ok(Self::new(scan.module_config(NAME)?, deps))
    }

    pub fn module_meta() -> ModuleMeta {
        ModuleMeta::new(NAME)
            .watches(EventType::DNS_NAME)
            .produces(EventType::DNS_NAME)
            .flag(ModuleFlag::Affiliates)
            .flag(ModuleFlag::SubdomainEnum)
            .flag(ModuleFlag::Passive)
            .flag(ModuleFlag::Safe)
            .description("Query Builtwith.com for subdomains")
            .auth_required()
            .option("api_key", serde_json::json!(""), "Builtwith API key")
            .option(
                "redirects",
                serde_json::json!(true),
                "Also look up inbound and outbound redirects",
            )
    }

    fn domains_url(&self, query: &str) -> RequestResult<String> {
        self.source.url(
            "/v20/api.json",
            &[
                ("LOOKUP", query),
                ("NOMETA", "yes"),
                ("NOATTR", "yes"),
                ("HIDETEXT", "yes"),
                ("HIDEDL", "yes"),
            ],
        )
    }

    fn redirects_url(&self, query: &str) -> RequestResult<String> {
        self.source.url("/redirect1/api.json", &[("LOOKUP", query)])
    }
}

#[async_trait]
impl Module for BuiltWith {
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

        let domains = self
            .source
            .query(&query, |q| self.domains_url(q), &DomainsParser)
            .await;
        for domain in domains {
            let domain = normalize_dns_name(&domain);
            if domain == current {
                continue;
            }
            emitter.emit_event(domain, EventType::DNS_NAME, &event, &[])?;
        }

        if !self.config.redirects() {
            debug!(query = %query, "redirect lookups disabled");
            return Ok(());
        }

        let redirects = self
            .source
            .query(&query, |q| self.redirects_url(q), &RedirectsParser)
            .await;
        for redirect in redirects {
            let redirect = normalize_dns_name(&redirect);
            if redirect == current {
                continue;
            }
            emitter.emit_event(redirect, EventType::DNS_NAME, &event, &[AFFILIATE_TAG])?;
        }

        Ok(())
    }
}
