// Entry point for the recon CLI

mod args;
mod scan;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::args::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before parsing so API keys can come from it
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr; stdout belongs to output modules
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.list_modules {
        list_modules();
        return Ok(());
    }

    let config = args.scan_config()?;
    scan::run(config, &args).await
}

fn list_modules() {
    for meta in recon_modules::module_metas() {
        let flags = meta
            .flags
            .iter()
            .filter_map(|flag| serde_json::to_value(flag).ok())
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect::<Vec<_>>()
            .join(",");
        let auth = if meta.auth_required {
            " (api key)".yellow().to_string()
        } else {
            String::new()
        };

        println!("{}{}", meta.name.bold().cyan(), auth);
        println!("    {}", meta.description);
        println!("    flags: {}", flags.dimmed());
        for (option, description) in &meta.options_desc {
            println!("    {}: {}", option.green(), description);
        }
    }
}
