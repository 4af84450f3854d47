//! Human-readable terminal output.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use colored::Colorize;
use recon_core::{
    ConfigError, Event, EventType, ModuleMeta, ModuleResult, OutputModule, ScanConfig,
};
use serde::Deserialize;

pub const NAME: &str = "human";

/// `output_modules.human` config section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HumanOutputConfig {
    #[serde(default)]
    pub color: Option<bool>,
}

impl HumanOutputConfig {
    pub fn color(&self) -> bool {
        self.color.unwrap_or(true)
    }
}

/// Prints `[TYPE]  value  module  tags` per event.
pub struct HumanOutput {
    meta: ModuleMeta,
    config: HumanOutputConfig,
    printed: AtomicUsize,
}

impl HumanOutput {
    pub fn new(config: HumanOutputConfig) -> Self {
        Self {
            meta: ModuleMeta::new(NAME)
                .watches(EventType::ANY)
                .description("Output to text")
                .option("color", serde_json::json!(true), "Colorize output"),
            config,
            printed: AtomicUsize::new(0),
        }
    }

    pub fn from_scan_config(scan: &ScanConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(scan.output_module_config(NAME)?))
    }

    /// Render one event as a tab-separated line.
    pub fn format_line(&self, event: &Event) -> String {
        let event_type = format!("[{}]", event.event_type());
        let tags = event
            .tags()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");

        if self.config.color() {
            format!(
                "{}\t{}\t{}\t{}",
                event_type.bold().cyan(),
                event.value(),
                event.module().dimmed(),
                tags.yellow()
            )
        } else {
            format!(
                "{}\t{}\t{}\t{}",
                event_type,
                event.value(),
                event.module(),
                tags
            )
        }
    }

    pub fn printed(&self) -> usize {
        self.printed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutputModule for HumanOutput {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    async fn handle_event(&self, event: Arc<Event>) -> ModuleResult<()> {
        println!("{}", self.format_line(&event));
        self.printed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn finish(&self) -> ModuleResult<()> {
        eprintln!("{} events", self.printed());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::testing::dns_seed;

    #[test]
    fn test_plain_line() {
        let output = HumanOutput::new(HumanOutputConfig { color: Some(false) });
        let seed = Event::seed("example.com", EventType::DNS_NAME);
        let event = Event::child("old.com", EventType::DNS_NAME, &seed, "builtwith")
            .with_tag("affiliate");

        assert_eq!(
            output.format_line(&event),
            "[DNS_NAME]\told.com\tbuiltwith\taffiliate"
        );
    }

    #[tokio::test]
    async fn test_counts_printed_events() {
        let output = HumanOutput::new(HumanOutputConfig { color: Some(false) });
        output.handle_event(dns_seed("example.com")).await.unwrap();
        output.handle_event(dns_seed("example.org")).await.unwrap();
        assert_eq!(output.printed(), 2);
    }

    #[test]
    fn test_color_defaults_on() {
        assert!(HumanOutputConfig::default().color());
    }
}
