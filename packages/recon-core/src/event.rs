//! Events: discovered facts routed between modules.
//!
//! An [`Event`] is built mutably (tags, flags) by whoever creates it and is
//! frozen into an `Arc<Event>` once it is handed to the [`EventQueue`]. After
//! that nothing about it changes.
//!
//! Provenance is a value copy ([`SourceRef`]) of the causing event's identity,
//! not a pointer: holding a child event never keeps its source alive.
//!
//! [`EventQueue`]: crate::EventQueue

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Module name recorded on scan seed events.
pub const TARGET_MODULE: &str = "TARGET";

/// Tag attached to scan seed events.
pub const TARGET_TAG: &str = "target";

/// Unique identity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get a reference to the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Category tag of an event, e.g. `DNS_NAME`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    /// A DNS hostname.
    pub const DNS_NAME: EventType = EventType(Cow::Borrowed("DNS_NAME"));

    /// Wildcard used in `watched_events` to receive every type.
    pub const ANY: EventType = EventType(Cow::Borrowed("*"));

    /// Create an event type from any name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `*` wildcard.
    pub fn is_any(&self) -> bool {
        self.as_str() == "*"
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Dispatch flags. Only settable before the event is first dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFlags {
    /// Drop silently everywhere
    #[serde(default)]
    pub omit: bool,

    /// Not user-facing, still propagated between modules
    #[serde(default)]
    pub internal: bool,

    /// Bypass normal output suppression
    #[serde(default)]
    pub force_output: bool,
}

/// Back-reference to the event that caused another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Source event identity
    pub id: EventId,

    /// Source event type
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Source event value
    pub value: String,
}

/// A discovered fact.
///
/// Serializes to the wire shape
/// `{ id, value, type, tags, source, flags: {omit, internal, forceOutput}, scopeDistance, module, timestamp }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    id: EventId,
    value: String,
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    source: Option<SourceRef>,
    #[serde(default)]
    flags: EventFlags,
    #[serde(default)]
    scope_distance: u32,
    module: String,
    timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a scan seed event (scope distance 0, tagged `target`).
    pub fn seed(value: impl Into<String>, event_type: EventType) -> Self {
        Self {
            id: EventId::new(),
            value: value.into(),
            event_type,
            tags: BTreeSet::from([TARGET_TAG.to_string()]),
            source: None,
            flags: EventFlags::default(),
            scope_distance: 0,
            module: TARGET_MODULE.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Create an event caused by `source`.
    ///
    /// The new event gets a fresh ID, so it can never be its own source.
    pub fn child(
        value: impl Into<String>,
        event_type: EventType,
        source: &Event,
        module: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            value: value.into(),
            event_type,
            tags: BTreeSet::new(),
            source: Some(source.as_source_ref()),
            flags: EventFlags::default(),
            scope_distance: source.scope_distance.saturating_add(1),
            module: module.into(),
            timestamp: Utc::now(),
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Add several tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Replace all flags.
    pub fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Mark as omitted.
    pub fn omitted(mut self) -> Self {
        self.flags.omit = true;
        self
    }

    /// Mark as internal.
    pub fn internal(mut self) -> Self {
        self.flags.internal = true;
        self
    }

    /// Force output regardless of internal status.
    pub fn forced(mut self) -> Self {
        self.flags.force_output = true;
        self
    }

    /// Override the scope distance.
    pub fn with_scope_distance(mut self, distance: u32) -> Self {
        self.scope_distance = distance;
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn source(&self) -> Option<&SourceRef> {
        self.source.as_ref()
    }

    pub fn flags(&self) -> EventFlags {
        self.flags
    }

    pub fn scope_distance(&self) -> u32 {
        self.scope_distance
    }

    /// Name of the module that emitted this event.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this event was seeded by the scan rather than discovered.
    pub fn is_seed(&self) -> bool {
        self.source.is_none()
    }

    /// Identity used for duplicate suppression: type plus value.
    pub fn dedup_key(&self) -> (EventType, String) {
        (self.event_type.clone(), self.value.clone())
    }

    /// Whether emitting `value` as `event_type` from this event would be a
    /// self-referential loop.
    pub fn is_same_fact(&self, value: &str, event_type: &EventType) -> bool {
        self.value == value && &self.event_type == event_type
    }

    /// Provenance reference to this event.
    pub fn as_source_ref(&self) -> SourceRef {
        SourceRef {
            id: self.id,
            event_type: self.event_type.clone(),
            value: self.value.clone(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(\"{}\")", self.event_type, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_event() {
        let seed = Event::seed("example.com", EventType::DNS_NAME);
        assert!(seed.is_seed());
        assert!(seed.has_tag(TARGET_TAG));
        assert_eq!(seed.scope_distance(), 0);
        assert_eq!(seed.module(), TARGET_MODULE);
        assert_eq!(seed.flags(), EventFlags::default());
    }

    #[test]
    fn test_child_event_provenance() {
        let seed = Event::seed("example.com", EventType::DNS_NAME);
        let child = Event::child("www.example.com", EventType::DNS_NAME, &seed, "builtwith")
            .with_tag("affiliate");

        let source = child.source().unwrap();
        assert_eq!(source.id, seed.id());
        assert_eq!(source.value, "example.com");
        assert_ne!(child.id(), seed.id());
        assert_eq!(child.scope_distance(), 1);
        assert_eq!(child.module(), "builtwith");
        assert!(child.has_tag("affiliate"));
        assert!(!child.has_tag(TARGET_TAG));
    }

    #[test]
    fn test_flag_builders() {
        let event = Event::seed("example.com", EventType::DNS_NAME)
            .internal()
            .forced();
        assert!(event.flags().internal);
        assert!(event.flags().force_output);
        assert!(!event.flags().omit);
        assert!(event.omitted().flags().omit);
    }

    #[test]
    fn test_same_fact() {
        let event = Event::seed("example.com", EventType::DNS_NAME);
        assert!(event.is_same_fact("example.com", &EventType::DNS_NAME));
        assert!(!event.is_same_fact("sub.example.com", &EventType::DNS_NAME));
        assert!(!event.is_same_fact("example.com", &EventType::new("URL")));
    }

    #[test]
    fn test_wire_shape() {
        let seed = Event::seed("example.com", EventType::DNS_NAME);
        let child = Event::child("sub.example.com", EventType::DNS_NAME, &seed, "builtwith")
            .internal()
            .with_tag("affiliate");

        let json = serde_json::to_value(&child).unwrap();
        assert_eq!(json["value"], "sub.example.com");
        assert_eq!(json["type"], "DNS_NAME");
        assert_eq!(json["tags"], serde_json::json!(["affiliate"]));
        assert_eq!(json["source"]["value"], "example.com");
        assert_eq!(json["source"]["type"], "DNS_NAME");
        assert_eq!(
            json["flags"],
            serde_json::json!({"omit": false, "internal": true, "forceOutput": false})
        );
        assert_eq!(json["scopeDistance"], 1);
        assert_eq!(json["module"], "builtwith");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.id(), child.id());
        assert_eq!(back.flags(), child.flags());
    }

    #[test]
    fn test_event_type_display() {
        assert_eq!(EventType::DNS_NAME.to_string(), "DNS_NAME");
        assert!(EventType::ANY.is_any());
        assert_eq!(EventType::from("DNS_NAME"), EventType::DNS_NAME);
    }
}
