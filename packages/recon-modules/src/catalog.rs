//! Name-based construction of the modules this crate ships.

use std::sync::Arc;

use recon_core::{ConfigError, Module, ModuleMeta, OutputModule, ScanConfig};
use thiserror::Error;

use crate::builtwith::{self, BuiltWith};
use crate::output::{human, json, HumanOutput, JsonOutput};
use crate::shodan_dns::{self, ShodanDns};
use crate::source::SourceDeps;

/// Scan modules available by name.
pub const MODULES: &[&str] = &[builtwith::NAME, shodan_dns::NAME];

/// Output modules available by name.
pub const OUTPUT_MODULES: &[&str] = &[json::NAME, human::NAME];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("unknown output module: {0}")]
    UnknownOutput(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Build a scan module from its `modules.<name>` config section.
pub fn build_module(
    name: &str,
    scan: &ScanConfig,
    deps: &SourceDeps,
) -> Result<Arc<dyn Module>, CatalogError> {
    let module: Arc<dyn Module> = match name {
        builtwith::NAME => Arc::new(BuiltWith::from_scan_config(scan, deps.clone())?),
        shodan_dns::NAME => Arc::new(ShodanDns::from_scan_config(scan, deps.clone())?),
        other => return Err(CatalogError::UnknownModule(other.to_string())),
    };
    Ok(module)
}

/// Build an output module from its `output_modules.<name>` config section.
pub fn build_output(name: &str, scan: &ScanConfig) -> Result<Arc<dyn OutputModule>, CatalogError> {
    let output: Arc<dyn OutputModule> = match name {
        json::NAME => Arc::new(JsonOutput::from_scan_config(scan)?),
        human::NAME => Arc::new(HumanOutput::from_scan_config(scan)?),
        other => return Err(CatalogError::UnknownOutput(other.to_string())),
    };
    Ok(output)
}

/// Metadata of every scan module, for listing.
pub fn module_metas() -> Vec<ModuleMeta> {
    vec![BuiltWith::module_meta(), ShodanDns::module_meta()]
}
