//! Module registration, setup and routing.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{ModuleResult, RegistryError};
use crate::event::{Event, EventType};
use crate::module::{Module, SetupOutcome};
use crate::queue::EventQueue;
use crate::runner::{Delivery, ModuleRunner};

/// The set of scan modules taking part in a scan.
///
/// # Example
///
/// ```ignore
/// let (queue, mut receiver) = EventQueue::new();
/// let mut registry = ModuleRegistry::new(queue);
/// registry.register(Arc::new(BuiltWith::from_config(&config, deps)?))?;
///
/// registry.setup_all().await;
/// registry.dispatch(Arc::new(Event::seed("example.com", EventType::DNS_NAME))).await?;
/// ```
pub struct ModuleRegistry {
    runners: Vec<ModuleRunner>,
    names: HashSet<String>,
    queue: EventQueue,
}

impl ModuleRegistry {
    /// Create an empty registry whose modules emit onto `queue`.
    pub fn new(queue: EventQueue) -> Self {
        Self {
            runners: Vec::new(),
            names: HashSet::new(),
            queue,
        }
    }

    /// Validate a module's metadata and add it.
    pub fn register(&mut self, module: Arc<dyn Module>) -> Result<(), RegistryError> {
        let meta = module.meta();
        let name = meta.name.trim();

        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.names.contains(name) {
            return Err(RegistryError::DuplicateModule {
                name: name.to_string(),
            });
        }
        if meta.watched_events.is_empty() {
            return Err(RegistryError::NoWatchedEvents {
                name: name.to_string(),
            });
        }
        if meta.produced_events.iter().any(EventType::is_any) {
            return Err(RegistryError::WildcardProduced {
                name: name.to_string(),
            });
        }

        debug!(module = %name, "registered module");
        self.names.insert(name.to_string());
        self.runners
            .push(ModuleRunner::new(module, self.queue.clone()));
        Ok(())
    }

    /// Run setup and ping on every module, keeping only the ready ones.
    ///
    /// Skipped or failing modules are logged and removed; they never fail
    /// the scan. Returns the names of the modules still registered.
    pub async fn setup_all(&mut self) -> Vec<String> {
        let outcomes = join_all(self.runners.iter().map(|runner| async move {
            match runner.setup().await {
                Ok(SetupOutcome::Ready) => match runner.ping().await {
                    Ok(()) => true,
                    Err(error) => {
                        warn!(module = %runner.name(), error = %error, "ping failed, disabling module");
                        false
                    }
                },
                Ok(SetupOutcome::Skip(reason)) => {
                    warn!(module = %runner.name(), reason = %reason, "module skipped");
                    false
                }
                Err(error) => {
                    warn!(module = %runner.name(), error = %error, "module setup failed");
                    false
                }
            }
        }))
        .await;

        let mut ready = outcomes.into_iter();
        self.runners.retain(|_| ready.next().unwrap_or(false));
        self.names = self.runners.iter().map(|r| r.name().to_string()).collect();

        let names = self.names();
        info!(modules = ?names, "modules ready");
        names
    }

    /// Names of modules watching `event_type`.
    pub fn routes(&self, event_type: &EventType) -> Vec<&str> {
        self.runners
            .iter()
            .filter(|runner| runner.watches(event_type))
            .map(ModuleRunner::name)
            .collect()
    }

    /// Offer `event` to every module concurrently.
    ///
    /// Returns how many modules handled it.
    ///
    /// # Errors
    ///
    /// The first contract violation raised by any module. The other modules
    /// still finish handling the event.
    pub async fn dispatch(&self, event: Arc<Event>) -> ModuleResult<usize> {
        let deliveries = join_all(
            self.runners
                .iter()
                .filter(|runner| runner.watches(event.event_type()))
                .map(|runner| runner.deliver(event.clone())),
        )
        .await;

        let mut handled = 0;
        for delivery in deliveries {
            if delivery? == Delivery::Handled {
                handled += 1;
            }
        }
        Ok(handled)
    }

    pub fn names(&self) -> Vec<String> {
        self.runners.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}
