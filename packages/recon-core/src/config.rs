//! Scan configuration and per-module scoping.
//!
//! The document is JSON:
//!
//! ```json
//! {
//!   "modules": { "builtwith": { "api_key": "...", "redirects": false } },
//!   "output_modules": { "json": { "output_file": "scan.ndjson" } },
//!   "scan": { "cache_ttl_secs": 3600, "requests_per_second": 5 }
//! }
//! ```
//!
//! Modules never see the whole document: they deserialize their own section
//! into a typed struct. A missing or `null` section means "all defaults".

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Top-level config section a module reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigNamespace {
    Modules,
    OutputModules,
}

impl ConfigNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modules => "modules",
            Self::OutputModules => "output_modules",
        }
    }
}

/// Scan-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// How long cached source responses are reused
    pub cache_ttl_secs: u64,

    /// HTTP request timeout
    pub http_timeout_secs: u64,

    /// Per-source request rate, unlimited when absent
    pub requests_per_second: Option<u32>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            http_timeout_secs: 30,
            requests_per_second: None,
        }
    }
}

/// The scan configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub modules: BTreeMap<String, Value>,
    pub output_modules: BTreeMap<String, Value>,
    pub scan: ScanSettings,
}

impl ScanConfig {
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&document)
    }

    /// Typed view of `modules.<name>`.
    pub fn module_config<T>(&self, name: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        self.scoped(ConfigNamespace::Modules, name)
    }

    /// Typed view of `output_modules.<name>`.
    pub fn output_module_config<T>(&self, name: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        self.scoped(ConfigNamespace::OutputModules, name)
    }

    /// Typed view of one module's section. Missing or `null` yields
    /// `T::default()`.
    pub fn scoped<T>(&self, namespace: ConfigNamespace, name: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        match self.section(namespace).get(name) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => {
                T::deserialize(value).map_err(|source| ConfigError::Invalid {
                    namespace: namespace.as_str(),
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Set `modules.<name>.<key>`, creating the section if needed.
    pub fn set_module_option(&mut self, name: &str, key: &str, value: Value) {
        set_option(&mut self.modules, name, key, value);
    }

    /// Set `output_modules.<name>.<key>`, creating the section if needed.
    pub fn set_output_module_option(&mut self, name: &str, key: &str, value: Value) {
        set_option(&mut self.output_modules, name, key, value);
    }

    fn section(&self, namespace: ConfigNamespace) -> &BTreeMap<String, Value> {
        match namespace {
            ConfigNamespace::Modules => &self.modules,
            ConfigNamespace::OutputModules => &self.output_modules,
        }
    }
}

fn set_option(section: &mut BTreeMap<String, Value>, name: &str, key: &str, value: Value) {
    let entry = section
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Default::default()));
    if !entry.is_object() {
        *entry = Value::Object(Default::default());
    }
    if let Value::Object(map) = entry {
        map.insert(key.to_string(), value);
    }
}

/// Deserialize an optional string, treating blank as absent.
///
/// Use with `#[serde(default, deserialize_with = "empty_string_as_none")]`.
pub fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
