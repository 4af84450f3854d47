//! Output modules: terminal consumers of scan events.
//!
//! Output modules differ from scan modules in three ways:
//!
//! - they accept duplicates by default
//! - their config lives under `output_modules.<name>`
//! - every item passes the [`output_filter`] before delivery, and lifecycle
//!   [`ControlSignal`]s are routed to [`OutputModule::report`] and
//!   [`OutputModule::finish`]

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use tracing::{info_span, trace, warn, Instrument};

use crate::error::ModuleResult;
use crate::event::{Event, EventType};
use crate::filter::{output_filter, ControlSignal, Dispatched, FilterDecision, FilterPhase};
use crate::module::{ModuleMeta, SetupOutcome};

/// A terminal consumer of events.
#[async_trait]
pub trait OutputModule: Send + Sync + 'static {
    fn meta(&self) -> &ModuleMeta;

    fn name(&self) -> &str {
        &self.meta().name
    }

    async fn setup(&self) -> ModuleResult<SetupOutcome> {
        Ok(SetupOutcome::Ready)
    }

    /// Extra, module-specific acceptance check run after the output filter.
    fn filter_event(&self, _event: &Event) -> FilterDecision {
        FilterDecision::Accept
    }

    /// Materialize one event.
    async fn handle_event(&self, event: Arc<Event>) -> ModuleResult<()>;

    async fn report(&self) -> ModuleResult<()> {
        Ok(())
    }

    /// Flush and release resources. Called once at the end of the scan.
    async fn finish(&self) -> ModuleResult<()> {
        Ok(())
    }

    fn accept_dupes(&self) -> bool {
        true
    }
}

struct OutputSlot {
    output: Arc<dyn OutputModule>,
    seen: DashSet<(EventType, String)>,
}

/// Fans items out to every registered output module.
///
/// Output failures are logged and never stop delivery to other outputs.
#[derive(Default)]
pub struct OutputDispatcher {
    slots: Vec<OutputSlot>,
}

impl OutputDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an output module.
    pub fn add(&mut self, output: Arc<dyn OutputModule>) {
        self.slots.push(OutputSlot {
            output,
            seen: DashSet::new(),
        });
    }

    /// Builder form of [`add`](Self::add).
    pub fn with_output(mut self, output: Arc<dyn OutputModule>) -> Self {
        self.add(output);
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.output.name()).collect()
    }

    /// Run setup on every output, dropping the ones that skip or fail.
    pub async fn setup_all(&mut self) {
        let mut ready = Vec::with_capacity(self.slots.len());
        for slot in self.slots.drain(..) {
            let name = slot.output.name().to_string();
            match slot.output.setup().await {
                Ok(SetupOutcome::Ready) => ready.push(slot),
                Ok(SetupOutcome::Skip(reason)) => {
                    warn!(output = %name, reason = %reason, "output module skipped");
                }
                Err(error) => {
                    warn!(output = %name, error = %error, "output module setup failed");
                }
            }
        }
        self.slots = ready;
    }

    /// Deliver an item to every output that accepts it.
    ///
    /// Returns the number of outputs that received it.
    pub async fn dispatch(&self, item: impl Into<Dispatched>) -> usize {
        let item = item.into();
        let mut delivered = 0;
        for slot in &self.slots {
            if deliver(slot, &item).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Ask every output for a report.
    pub async fn report(&self) -> usize {
        self.dispatch(ControlSignal::Report).await
    }

    /// Tell every output that the scan is done.
    pub async fn finish(&self) -> usize {
        self.dispatch(ControlSignal::Finished).await
    }
}

async fn deliver(slot: &OutputSlot, item: &Dispatched) -> bool {
    let output = &slot.output;
    let name = output.name();

    if let FilterDecision::Reject(reason) = output_filter(item, FilterPhase::PreCheck) {
        trace!(output = %name, reason = %reason, "rejected at pre-check");
        return false;
    }

    let event = match item {
        Dispatched::Signal(signal) => {
            let result = match signal {
                ControlSignal::Report => output.report().await,
                ControlSignal::Finished => output.finish().await,
            };
            if let Err(error) = result {
                warn!(output = %name, signal = ?signal, error = %error, "output signal handling failed");
                return false;
            }
            return true;
        }
        Dispatched::Event(event) => event,
    };

    if !output.meta().is_watching(event.event_type()) {
        return false;
    }

    if !output.accept_dupes() && !slot.seen.insert(event.dedup_key()) {
        trace!(output = %name, event = %event, "duplicate suppressed");
        return false;
    }

    match output_filter(item, FilterPhase::Dispatch) {
        FilterDecision::Reject(reason) => {
            trace!(output = %name, reason = %reason, event = %event, "rejected at dispatch");
            return false;
        }
        FilterDecision::Forced => {
            trace!(output = %name, event = %event, "forced output");
        }
        FilterDecision::Accept => {}
    }

    if let FilterDecision::Reject(reason) = output.filter_event(event) {
        trace!(output = %name, reason = %reason, event = %event, "rejected by output module");
        return false;
    }

    let span = info_span!("output", name = %name);
    match output.handle_event(event.clone()).instrument(span).await {
        Ok(()) => true,
        Err(error) => {
            warn!(output = %name, event = %event, error = %error, "output module failed to handle event");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingOutput;

    fn dns(value: &str) -> Arc<Event> {
        Arc::new(Event::seed(value, EventType::DNS_NAME))
    }

    #[tokio::test]
    async fn test_dispatch_respects_flags() {
        let recorder = Arc::new(RecordingOutput::new("recorder"));
        let dispatcher = OutputDispatcher::new().with_output(recorder.clone());

        assert_eq!(dispatcher.dispatch(dns("visible.com")).await, 1);
        assert_eq!(
            dispatcher
                .dispatch(Arc::new(Event::seed("hidden.com", EventType::DNS_NAME).internal()))
                .await,
            0
        );
        assert_eq!(
            dispatcher
                .dispatch(Arc::new(
                    Event::seed("forced.com", EventType::DNS_NAME).internal().forced()
                ))
                .await,
            1
        );
        assert_eq!(
            dispatcher
                .dispatch(Arc::new(Event::seed("gone.com", EventType::DNS_NAME).omitted()))
                .await,
            0
        );

        assert_eq!(recorder.values(), vec!["visible.com", "forced.com"]);
    }

    #[tokio::test]
    async fn test_outputs_accept_duplicates() {
        let recorder = Arc::new(RecordingOutput::new("recorder"));
        let dispatcher = OutputDispatcher::new().with_output(recorder.clone());

        dispatcher.dispatch(dns("example.com")).await;
        dispatcher.dispatch(dns("example.com")).await;

        assert_eq!(recorder.values().len(), 2);
    }

    #[tokio::test]
    async fn test_dedup_when_output_rejects_dupes() {
        let recorder = Arc::new(RecordingOutput::new("recorder").without_dupes());
        let dispatcher = OutputDispatcher::new().with_output(recorder.clone());

        dispatcher.dispatch(dns("example.com")).await;
        dispatcher.dispatch(dns("example.com")).await;

        assert_eq!(recorder.values(), vec!["example.com"]);
    }

    #[tokio::test]
    async fn test_signals_route_to_lifecycle_hooks() {
        let recorder = Arc::new(RecordingOutput::new("recorder"));
        let dispatcher = OutputDispatcher::new().with_output(recorder.clone());

        assert_eq!(dispatcher.report().await, 1);
        assert_eq!(dispatcher.finish().await, 1);

        assert_eq!(recorder.reports(), 1);
        assert!(recorder.is_finished());
        assert!(recorder.values().is_empty());
    }

    #[tokio::test]
    async fn test_failing_output_does_not_block_others() {
        let failing = Arc::new(RecordingOutput::new("failing").failing());
        let recorder = Arc::new(RecordingOutput::new("recorder"));
        let dispatcher = OutputDispatcher::new()
            .with_output(failing)
            .with_output(recorder.clone());

        assert_eq!(dispatcher.dispatch(dns("example.com")).await, 1);
        assert_eq!(recorder.values(), vec!["example.com"]);
    }

    #[tokio::test]
    async fn test_setup_drops_skipped_outputs() {
        let mut dispatcher = OutputDispatcher::new()
            .with_output(Arc::new(RecordingOutput::new("skipped").skipping("no file")))
            .with_output(Arc::new(RecordingOutput::new("ready")));

        dispatcher.setup_all().await;

        assert_eq!(dispatcher.names(), vec!["ready"]);
    }
}
