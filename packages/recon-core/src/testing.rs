//! Test helpers for modules and outputs.
//!
//! Enabled inside this crate's tests and for downstream crates through the
//! `testing` feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::emit::Emitter;
use crate::error::{ModuleError, ModuleResult};
use crate::event::{Event, EventType};
use crate::filter::FilterDecision;
use crate::module::{Module, ModuleMeta, SetupOutcome};
use crate::output::OutputModule;
use crate::queue::EventReceiver;

/// Values of every event currently waiting in `receiver`, in emission order.
pub fn collect_values(receiver: &mut EventReceiver) -> Vec<String> {
    receiver
        .drain()
        .iter()
        .map(|event| event.value().to_string())
        .collect()
}

/// A `DNS_NAME` seed event.
pub fn dns_seed(value: &str) -> Arc<Event> {
    Arc::new(Event::seed(value, EventType::DNS_NAME))
}

/// A `DNS_NAME` event discovered from `source` by `module`.
pub fn dns_child(value: &str, source: &Event, module: &str) -> Arc<Event> {
    Arc::new(Event::child(value, EventType::DNS_NAME, source, module))
}

/// A scripted scan module.
///
/// Watches and produces `DNS_NAME` unless built with [`StaticModule::with_meta`].
pub struct StaticModule {
    meta: ModuleMeta,
    emits: Vec<String>,
    emit_as: EventType,
    accept_dupes: bool,
    reject: Option<String>,
    setup: SetupOutcome,
    unreachable: bool,
    fail: bool,
    panic: bool,
    handled: AtomicUsize,
}

impl StaticModule {
    pub fn new(name: &str) -> Self {
        Self::with_meta(
            ModuleMeta::new(name)
                .watches(EventType::DNS_NAME)
                .produces(EventType::DNS_NAME),
        )
    }

    pub fn with_meta(meta: ModuleMeta) -> Self {
        Self {
            meta,
            emits: Vec::new(),
            emit_as: EventType::DNS_NAME,
            accept_dupes: false,
            reject: None,
            setup: SetupOutcome::Ready,
            unreachable: false,
            fail: false,
            panic: false,
            handled: AtomicUsize::new(0),
        }
    }

    /// Emit these values for every handled event.
    pub fn emitting<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.emits.extend(values.into_iter().map(Into::into));
        self
    }

    /// Emit values as this type instead of `DNS_NAME`.
    pub fn emitting_as(mut self, event_type: EventType) -> Self {
        self.emit_as = event_type;
        self
    }

    pub fn accepting_dupes(mut self) -> Self {
        self.accept_dupes = true;
        self
    }

    /// Reject events with this value in `filter_event`.
    pub fn rejecting(mut self, value: &str) -> Self {
        self.reject = Some(value.to_string());
        self
    }

    pub fn skipping(mut self, reason: &str) -> Self {
        self.setup = SetupOutcome::skip(reason);
        self
    }

    /// Fail the liveness check.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Return a recoverable error from `handle_event`.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    /// Number of `handle_event` calls so far.
    pub fn handled(&self) -> usize {
        self.handled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Module for StaticModule {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    async fn setup(&self) -> ModuleResult<SetupOutcome> {
        Ok(self.setup.clone())
    }

    async fn ping(&self) -> ModuleResult<()> {
        if self.unreachable {
            return Err(ModuleError::Source(format!("{} is unreachable", self.meta.name)));
        }
        Ok(())
    }

    fn filter_event(&self, event: &Event) -> FilterDecision {
        match &self.reject {
            Some(value) if value == event.value() => FilterDecision::reject("scripted rejection"),
            _ => FilterDecision::Accept,
        }
    }

    async fn handle_event(&self, event: Arc<Event>, emitter: &Emitter) -> ModuleResult<()> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("{} panicked", self.meta.name);
        }
        if self.fail {
            return Err(ModuleError::Source("scripted failure".into()));
        }
        for value in &self.emits {
            emitter.emit_event(value.as_str(), self.emit_as.clone(), &event, &[])?;
        }
        Ok(())
    }

    fn accept_dupes(&self) -> bool {
        self.accept_dupes
    }
}

/// An output module that records what it receives.
pub struct RecordingOutput {
    meta: ModuleMeta,
    events: Mutex<Vec<Arc<Event>>>,
    reports: AtomicUsize,
    finished: AtomicUsize,
    accept_dupes: bool,
    fail: bool,
    setup: SetupOutcome,
}

impl RecordingOutput {
    pub fn new(name: &str) -> Self {
        Self {
            meta: ModuleMeta::new(name).watches(EventType::ANY),
            events: Mutex::new(Vec::new()),
            reports: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            accept_dupes: true,
            fail: false,
            setup: SetupOutcome::Ready,
        }
    }

    pub fn without_dupes(mut self) -> Self {
        self.accept_dupes = false;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn skipping(mut self, reason: &str) -> Self {
        self.setup = SetupOutcome::skip(reason);
        self
    }

    pub fn events(&self) -> Vec<Arc<Event>> {
        self.events.lock().unwrap().clone()
    }

    pub fn values(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|event| event.value().to_string())
            .collect()
    }

    pub fn reports(&self) -> usize {
        self.reports.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl OutputModule for RecordingOutput {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    async fn setup(&self) -> ModuleResult<SetupOutcome> {
        Ok(self.setup.clone())
    }

    async fn handle_event(&self, event: Arc<Event>) -> ModuleResult<()> {
        if self.fail {
            return Err(ModuleError::Source("scripted output failure".into()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn report(&self) -> ModuleResult<()> {
        self.reports.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(&self) -> ModuleResult<()> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn accept_dupes(&self) -> bool {
        self.accept_dupes
    }
}
