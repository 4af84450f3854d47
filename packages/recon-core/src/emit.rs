//! Emission: building child events and handing them to the orchestrator.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::EmitError;
use crate::event::{Event, EventId, EventType};
use crate::module::ModuleMeta;
use crate::queue::EventQueue;

/// Per-module emission handle.
///
/// Checks every event against the module's declared `produced_events`,
/// merges the module's default tags and pushes the event onto the queue.
#[derive(Debug, Clone)]
pub struct Emitter {
    module: String,
    produced: BTreeSet<EventType>,
    default_tags: BTreeSet<String>,
    queue: EventQueue,
}

impl Emitter {
    pub fn new(meta: &ModuleMeta, queue: EventQueue) -> Self {
        Self {
            module: meta.name.clone(),
            produced: meta.produced_events.clone(),
            default_tags: meta.default_tags.clone(),
            queue,
        }
    }

    /// Name of the module this emitter belongs to.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Emit `value` as a new event caused by `source`.
    ///
    /// Returns `Ok(None)` when the event would repeat its source (same value,
    /// same type); nothing is queued in that case.
    ///
    /// # Errors
    ///
    /// [`EmitError::UndeclaredEventType`] if the module did not declare
    /// `event_type`, [`EmitError::QueueClosed`] if the scan is shutting down.
    pub fn emit_event(
        &self,
        value: impl Into<String>,
        event_type: EventType,
        source: &Event,
        tags: &[&str],
    ) -> Result<Option<EventId>, EmitError> {
        let value = value.into();
        if source.is_same_fact(&value, &event_type) {
            debug!(
                module = %self.module,
                event_type = %event_type,
                value = %value,
                "dropping self-referential emission"
            );
            return Ok(None);
        }

        let event = Event::child(value, event_type, source, self.module.as_str())
            .with_tags(tags.iter().copied());
        self.emit(event).map(Some)
    }

    /// Emit a fully built event.
    ///
    /// Use this to set flags (`internal`, `omit`, `force_output`) before the
    /// event is dispatched.
    pub fn emit(&self, event: Event) -> Result<EventId, EmitError> {
        if !self.produced.contains(event.event_type()) {
            return Err(EmitError::UndeclaredEventType {
                module: self.module.clone(),
                event_type: event.event_type().clone(),
            });
        }

        let event = event.with_tags(self.default_tags.iter().cloned());
        let id = event.id();
        trace!(module = %self.module, event = %event, "emitting event");
        self.queue.emit(Arc::new(event))?;
        Ok(id)
    }
}
