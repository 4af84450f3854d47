//! Command-line arguments and how they fold into the scan config.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use recon_core::ScanConfig;
use recon_modules::{builtwith, output::json, shodan_dns};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "recon", version, about = "Run recon modules against seed domains")]
pub struct Args {
    /// Seed domains
    #[arg(required_unless_present = "list_modules")]
    pub targets: Vec<String>,

    /// JSON scan config (modules, output_modules, scan)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Scan modules to run (default: all)
    #[arg(short = 'm', long = "module", value_delimiter = ',')]
    pub modules: Vec<String>,

    /// Output modules
    #[arg(short = 'o', long = "output", value_delimiter = ',', default_value = "human")]
    pub outputs: Vec<String>,

    /// File for the json output module
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    #[arg(long, env = "BUILTWITH_API_KEY", hide_env_values = true)]
    pub builtwith_api_key: Option<String>,

    #[arg(long, env = "SHODAN_API_KEY", hide_env_values = true)]
    pub shodan_api_key: Option<String>,

    /// Skip builtwith redirect lookups
    #[arg(long)]
    pub no_redirects: bool,

    /// Requests per second per source
    #[arg(long)]
    pub rate_limit: Option<u32>,

    /// List available modules and exit
    #[arg(long)]
    pub list_modules: bool,
}

impl Args {
    /// Load the config file (if any) and apply command-line overrides.
    pub fn scan_config(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::from_path(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ScanConfig::default(),
        };

        if let Some(key) = &self.builtwith_api_key {
            config.set_module_option(builtwith::NAME, "api_key", Value::from(key.as_str()));
        }
        if let Some(key) = &self.shodan_api_key {
            config.set_module_option(shodan_dns::NAME, "api_key", Value::from(key.as_str()));
        }
        if self.no_redirects {
            config.set_module_option(builtwith::NAME, "redirects", Value::from(false));
        }
        if let Some(path) = &self.output_file {
            config.set_output_module_option(
                json::NAME,
                "output_file",
                Value::from(path.display().to_string()),
            );
        }
        if let Some(rate) = self.rate_limit {
            config.scan.requests_per_second = Some(rate);
        }

        Ok(config)
    }

    /// Selected scan modules, all of them when none were named.
    pub fn selected_modules(&self) -> Vec<String> {
        if self.modules.is_empty() {
            recon_modules::catalog::MODULES
                .iter()
                .map(|name| name.to_string())
                .collect()
        } else {
            self.modules.clone()
        }
    }
}
