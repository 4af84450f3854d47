//! The module contract.
//!
//! A module declares which event types it watches and produces, optionally
//! checks its configuration and source at setup, and reacts to each
//! dispatched event by emitting zero or more new events.
//!
//! # Example
//!
//! ```ignore
//! struct Echo { meta: ModuleMeta }
//!
//! #[async_trait]
//! impl Module for Echo {
//!     fn meta(&self) -> &ModuleMeta {
//!         &self.meta
//!     }
//!
//!     async fn handle_event(&self, event: Arc<Event>, emitter: &Emitter) -> ModuleResult<()> {
//!         emitter.emit_event(format!("www.{}", event.value()), EventType::DNS_NAME, &event, &[])?;
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::emit::Emitter;
use crate::error::ModuleResult;
use crate::event::{Event, EventType};
use crate::filter::FilterDecision;

/// Behavioral label attached to a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleFlag {
    /// Discovers affiliated (not necessarily in-scope) assets
    Affiliates,
    /// Enumerates subdomains
    SubdomainEnum,
    /// Never touches the target directly
    Passive,
    /// Safe to run against any target
    Safe,
    /// Sends traffic to the target
    Active,
}

/// Static capability record of a module.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleMeta {
    pub name: String,
    pub watched_events: BTreeSet<EventType>,
    pub produced_events: BTreeSet<EventType>,
    pub flags: BTreeSet<ModuleFlag>,
    pub description: String,
    pub auth_required: bool,

    /// Option names and their documented defaults
    pub options: BTreeMap<String, serde_json::Value>,

    /// Option names and their descriptions
    pub options_desc: BTreeMap<String, String>,

    /// Tags attached to every event the module emits
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub default_tags: BTreeSet<String>,
}

impl ModuleMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn watches(mut self, event_type: EventType) -> Self {
        self.watched_events.insert(event_type);
        self
    }

    pub fn produces(mut self, event_type: EventType) -> Self {
        self.produced_events.insert(event_type);
        self
    }

    pub fn flag(mut self, flag: ModuleFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn auth_required(mut self) -> Self {
        self.auth_required = true;
        self
    }

    /// Document an option with its default value.
    pub fn option(
        mut self,
        name: impl Into<String>,
        default: serde_json::Value,
        description: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.options.insert(name.clone(), default);
        self.options_desc.insert(name, description.into());
        self
    }

    pub fn default_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tags.insert(tag.into());
        self
    }

    /// Whether events of `event_type` are delivered to this module.
    pub fn is_watching(&self, event_type: &EventType) -> bool {
        self.watched_events.contains(event_type) || self.watched_events.contains(&EventType::ANY)
    }

    /// Whether this module may emit `event_type`.
    pub fn is_producing(&self, event_type: &EventType) -> bool {
        self.produced_events.contains(event_type)
    }
}

/// Result of [`Module::setup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Module is ready to receive events
    Ready,
    /// Module stays inert for this scan
    Skip(String),
}

impl SetupOutcome {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// A scan module.
///
/// `handle_event` may be invoked concurrently on one instance; keep state in
/// `Send + Sync` containers.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Static capability record.
    fn meta(&self) -> &ModuleMeta;

    fn name(&self) -> &str {
        &self.meta().name
    }

    /// Validate configuration before the scan starts.
    ///
    /// Returning [`SetupOutcome::Skip`] disables the module without failing
    /// the scan.
    async fn setup(&self) -> ModuleResult<SetupOutcome> {
        Ok(SetupOutcome::Ready)
    }

    /// Liveness and credential check, run after a successful setup.
    ///
    /// The default checks nothing. Modules backed by a remote source
    /// override it with a cheap request against that source; a failure
    /// disables the module for the scan.
    async fn ping(&self) -> ModuleResult<()> {
        Ok(())
    }

    /// Module-specific acceptance check, run before `handle_event`.
    fn filter_event(&self, _event: &Event) -> FilterDecision {
        FilterDecision::Accept
    }

    /// React to one dispatched event.
    async fn handle_event(&self, event: Arc<Event>, emitter: &Emitter) -> ModuleResult<()>;

    /// Whether the same (type, value) may be delivered more than once.
    fn accept_dupes(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_builder() {
        let meta = ModuleMeta::new("builtwith")
            .watches(EventType::DNS_NAME)
            .produces(EventType::DNS_NAME)
            .flag(ModuleFlag::Affiliates)
            .flag(ModuleFlag::Passive)
            .auth_required()
            .option("redirects", serde_json::json!(true), "Also look up redirects");

        assert!(meta.is_watching(&EventType::DNS_NAME));
        assert!(!meta.is_watching(&EventType::new("URL")));
        assert!(meta.is_producing(&EventType::DNS_NAME));
        assert!(meta.auth_required);
        assert_eq!(meta.options["redirects"], serde_json::json!(true));
        assert_eq!(meta.options_desc["redirects"], "Also look up redirects");
    }

    #[test]
    fn test_wildcard_watch() {
        let meta = ModuleMeta::new("everything").watches(EventType::ANY);
        assert!(meta.is_watching(&EventType::DNS_NAME));
        assert!(meta.is_watching(&EventType::new("URL")));
    }

    #[test]
    fn test_meta_serializes_flags_kebab_case() {
        let meta = ModuleMeta::new("shodan_dns").flag(ModuleFlag::SubdomainEnum);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["flags"], serde_json::json!(["subdomain-enum"]));
        assert!(json.get("default_tags").is_none());
    }
}
