//! Per-module dispatch wrapper.
//!
//! `ModuleRunner` owns everything the orchestrator needs to drive one module:
//! its [`Emitter`], its tracing span, and the set of events it has already
//! seen.
//!
//! # Key Properties
//!
//! - **Watched types only**: events the module did not ask for never reach it
//! - **Own events skipped**: a module is not fed what it emitted itself
//! - **Dedup unless asked**: a (type, value) pair is handled once unless the
//!   module accepts duplicates
//! - **Failures absorbed**: ordinary errors are logged and the scan goes on;
//!   contract violations and panics are returned to the caller

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashSet;
use futures::FutureExt;
use tracing::{error, info_span, trace, warn, Instrument, Span};

use crate::emit::Emitter;
use crate::error::{ModuleError, ModuleResult};
use crate::event::{Event, EventType};
use crate::filter::{FilterDecision, RejectReason};
use crate::module::{Module, ModuleMeta, SetupOutcome};
use crate::queue::EventQueue;

/// What happened to an event offered to a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Handled,
    NotWatched,
    OwnEvent,
    Duplicate,
    Filtered(RejectReason),
    /// Handler returned a recoverable error (already logged)
    Failed,
}

/// Drives one module instance.
pub struct ModuleRunner {
    module: Arc<dyn Module>,
    emitter: Emitter,
    span: Span,
    seen: DashSet<(EventType, String)>,
}

impl ModuleRunner {
    pub fn new(module: Arc<dyn Module>, queue: EventQueue) -> Self {
        let emitter = Emitter::new(module.meta(), queue);
        let span = info_span!("module", name = %module.name());
        Self {
            module,
            emitter,
            span,
            seen: DashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn meta(&self) -> &ModuleMeta {
        self.module.meta()
    }

    pub fn watches(&self, event_type: &EventType) -> bool {
        self.module.meta().is_watching(event_type)
    }

    pub async fn setup(&self) -> ModuleResult<SetupOutcome> {
        self.module.setup().instrument(self.span.clone()).await
    }

    pub async fn ping(&self) -> ModuleResult<()> {
        self.module.ping().instrument(self.span.clone()).await
    }

    /// Offer one event to the module.
    ///
    /// # Errors
    ///
    /// Only contract violations (undeclared emitted type, panic) are returned;
    /// every other handler error is logged and reported as
    /// [`Delivery::Failed`].
    pub async fn deliver(&self, event: Arc<Event>) -> ModuleResult<Delivery> {
        if !self.watches(event.event_type()) {
            return Ok(Delivery::NotWatched);
        }

        if event.module() == self.name() {
            return Ok(Delivery::OwnEvent);
        }

        if !self.module.accept_dupes() && !self.seen.insert(event.dedup_key()) {
            trace!(parent: &self.span, event = %event, "duplicate event suppressed");
            return Ok(Delivery::Duplicate);
        }

        if let FilterDecision::Reject(reason) = self.module.filter_event(&event) {
            trace!(parent: &self.span, event = %event, reason = %reason, "event filtered");
            return Ok(Delivery::Filtered(reason));
        }

        let handled = AssertUnwindSafe(self.module.handle_event(event.clone(), &self.emitter))
            .catch_unwind()
            .instrument(self.span.clone())
            .await;

        let result = match handled {
            Ok(inner) => inner,
            Err(panic_info) => Err(ModuleError::Panicked(extract_panic_message(&panic_info))),
        };

        match result {
            Ok(()) => Ok(Delivery::Handled),
            Err(error) if error.is_contract_violation() => {
                error!(parent: &self.span, event = %event, error = %error, "module broke its contract");
                Err(error)
            }
            Err(error) => {
                warn!(parent: &self.span, event = %event, error = %error, "module failed to handle event");
                Ok(Delivery::Failed)
            }
        }
    }
}

impl std::fmt::Debug for ModuleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRunner")
            .field("name", &self.name())
            .field("seen", &self.seen.len())
            .finish_non_exhaustive()
    }
}

fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmitError;
    use crate::testing::{collect_values, StaticModule};

    fn seed(value: &str) -> Arc<Event> {
        Arc::new(Event::seed(value, EventType::DNS_NAME))
    }

    #[tokio::test]
    async fn test_handles_watched_event() {
        let (queue, mut receiver) = EventQueue::new();
        let module = Arc::new(StaticModule::new("static").emitting(["www.example.com"]));
        let runner = ModuleRunner::new(module.clone(), queue);

        let delivery = runner.deliver(seed("example.com")).await.unwrap();

        assert_eq!(delivery, Delivery::Handled);
        assert_eq!(module.handled(), 1);
        assert_eq!(collect_values(&mut receiver), vec!["www.example.com"]);
    }

    #[tokio::test]
    async fn test_skips_unwatched_type() {
        let (queue, _receiver) = EventQueue::new();
        let module = Arc::new(StaticModule::new("static"));
        let runner = ModuleRunner::new(module.clone(), queue);

        let url = Arc::new(Event::seed("https://example.com/", EventType::new("URL")));
        assert_eq!(runner.deliver(url).await.unwrap(), Delivery::NotWatched);
        assert_eq!(module.handled(), 0);
    }

    #[tokio::test]
    async fn test_skips_own_events() {
        let (queue, _receiver) = EventQueue::new();
        let module = Arc::new(StaticModule::new("static"));
        let runner = ModuleRunner::new(module.clone(), queue);

        let source = Event::seed("example.com", EventType::DNS_NAME);
        let own = Arc::new(Event::child("www.example.com", EventType::DNS_NAME, &source, "static"));

        assert_eq!(runner.deliver(own).await.unwrap(), Delivery::OwnEvent);
    }

    #[tokio::test]
    async fn test_suppresses_duplicates() {
        let (queue, _receiver) = EventQueue::new();
        let module = Arc::new(StaticModule::new("static"));
        let runner = ModuleRunner::new(module.clone(), queue);

        assert_eq!(runner.deliver(seed("example.com")).await.unwrap(), Delivery::Handled);
        assert_eq!(runner.deliver(seed("example.com")).await.unwrap(), Delivery::Duplicate);
        assert_eq!(module.handled(), 1);
    }

    #[tokio::test]
    async fn test_accept_dupes_bypasses_dedup() {
        let (queue, _receiver) = EventQueue::new();
        let module = Arc::new(StaticModule::new("static").accepting_dupes());
        let runner = ModuleRunner::new(module.clone(), queue);

        runner.deliver(seed("example.com")).await.unwrap();
        runner.deliver(seed("example.com")).await.unwrap();
        assert_eq!(module.handled(), 2);
    }

    #[tokio::test]
    async fn test_module_filter_rejects() {
        let (queue, _receiver) = EventQueue::new();
        let module = Arc::new(StaticModule::new("static").rejecting("example.com"));
        let runner = ModuleRunner::new(module.clone(), queue);

        let delivery = runner.deliver(seed("example.com")).await.unwrap();
        assert!(matches!(delivery, Delivery::Filtered(RejectReason::Module(_))));
        assert_eq!(module.handled(), 0);
    }

    #[tokio::test]
    async fn test_recoverable_failure_is_absorbed() {
        let (queue, _receiver) = EventQueue::new();
        let runner = ModuleRunner::new(Arc::new(StaticModule::new("static").failing()), queue);

        assert_eq!(runner.deliver(seed("example.com")).await.unwrap(), Delivery::Failed);
    }

    #[tokio::test]
    async fn test_undeclared_type_propagates() {
        let (queue, _receiver) = EventQueue::new();
        let module = StaticModule::new("static")
            .emitting(["https://example.com/"])
            .emitting_as(EventType::new("URL"));
        let runner = ModuleRunner::new(Arc::new(module), queue);

        let err = runner.deliver(seed("example.com")).await.unwrap_err();
        assert!(matches!(
            err,
            ModuleError::Emit(EmitError::UndeclaredEventType { .. })
        ));
    }

    #[tokio::test]
    async fn test_panic_becomes_contract_violation() {
        let (queue, _receiver) = EventQueue::new();
        let runner = ModuleRunner::new(Arc::new(StaticModule::new("static").panicking()), queue);

        let err = runner.deliver(seed("example.com")).await.unwrap_err();
        assert!(matches!(err, ModuleError::Panicked(ref msg) if msg.contains("static")));
    }
}
