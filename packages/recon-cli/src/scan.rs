//! Single-hop scan: seeds go to the selected modules, everything they emit
//! goes to the output modules.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use recon_core::{Event, EventQueue, EventType, ModuleRegistry, OutputDispatcher, ScanConfig};
use recon_modules::dns::normalize_dns_name;
use recon_modules::{build_module, build_output, SourceDeps};
use tracing::{info, warn};

use crate::args::Args;

pub async fn run(config: ScanConfig, args: &Args) -> Result<()> {
    let deps = SourceDeps::from_settings(&config.scan).context("Failed to build HTTP transport")?;

    let cancel = deps.pipeline.cancellation_token();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling in-flight requests");
                cancel.cancel();
            }
        }
    });

    let (queue, mut receiver) = EventQueue::new();
    let mut registry = ModuleRegistry::new(queue);
    for name in args.selected_modules() {
        let module = build_module(&name, &config, &deps)
            .with_context(|| format!("Failed to build module {}", name))?;
        registry.register(module)?;
    }
    if registry.setup_all().await.is_empty() {
        bail!("No modules are ready to run (missing API keys?)");
    }

    let mut outputs = OutputDispatcher::new();
    for name in &args.outputs {
        let output = build_output(name, &config)
            .with_context(|| format!("Failed to build output module {}", name))?;
        outputs.add(output);
    }
    outputs.setup_all().await;
    if outputs.is_empty() {
        bail!("No output modules are ready");
    }

    let seeds: Vec<Arc<Event>> = args
        .targets
        .iter()
        .map(|target| normalize_dns_name(target))
        .filter(|target| !target.is_empty())
        .map(|target| Arc::new(Event::seed(target, EventType::DNS_NAME)))
        .collect();
    info!(targets = seeds.len(), modules = ?registry.names(), "starting scan");

    for seed in &seeds {
        outputs.dispatch(seed.clone()).await;
    }

    // The registry owns the last queue senders; dropping it ends the consumer
    let produce = async move {
        let results = join_all(seeds.iter().map(|seed| registry.dispatch(seed.clone()))).await;
        drop(registry);
        results.into_iter().collect::<Result<Vec<_>, _>>()
    };
    let consume = async {
        let mut discovered = 0usize;
        while let Some(event) = receiver.recv().await {
            discovered += 1;
            outputs.dispatch(event).await;
        }
        discovered
    };

    let (produced, discovered) = tokio::join!(produce, consume);
    outputs.report().await;
    outputs.finish().await;

    let stats = deps.pipeline.stats();
    info!(
        discovered,
        requests = stats.requests,
        cache_hits = stats.cache_hits,
        failures = stats.failures,
        "scan finished"
    );

    produced.context("A module broke its contract")?;
    if cancel.is_cancelled() {
        warn!("scan was interrupted, results are incomplete");
    }
    Ok(())
}
