//! Recon modules built on `recon-core` and `query-pipeline`.
//!
//! # Scan modules
//!
//! - [`BuiltWith`] - subdomains and redirect affiliates from builtwith.com
//! - [`ShodanDns`] - subdomains from Shodan's DNS database
//!
//! Both compose an [`ApiSource`] and share one [`SourceDeps`] (transport and
//! query pipeline) per scan, so identical lookups are requested once.
//!
//! # Output modules
//!
//! - [`JsonOutput`] - newline-delimited JSON
//! - [`HumanOutput`] - one tab-separated line per event
//!
//! # Usage
//!
//! ```rust,ignore
//! let deps = SourceDeps::from_settings(&scan.scan)?;
//! let module = catalog::build_module("builtwith", &scan, &deps)?;
//! registry.register(module)?;
//! ```

pub mod builtwith;
pub mod catalog;
pub mod dns;
pub mod output;
pub mod shodan_dns;
pub mod source;

pub use builtwith::{BuiltWith, BuiltWithConfig, DomainsParser, RedirectsParser};
pub use catalog::{build_module, build_output, module_metas, CatalogError};
pub use output::{HumanOutput, HumanOutputConfig, JsonOutput, JsonOutputConfig};
pub use shodan_dns::{ShodanDns, ShodanDnsConfig, SubdomainsParser};
pub use source::{ApiSource, SourceDeps};
