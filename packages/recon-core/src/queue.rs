//! Event queue: the handoff from emitting modules to the orchestrator.
//!
//! # Guarantees
//!
//! - **Non-blocking**: `emit` never waits; backpressure is the orchestrator's
//!   concern, not the emitting module's
//! - **Ordered per sender**: events from one module arrive in emission order
//! - **In-memory only**: events are not persisted
//!
//! Ownership of an emitted event moves to the queue; the orchestrator owns it
//! from the moment it is received.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::EmitError;
use crate::event::Event;

/// Sending half of the event queue.
///
/// Cheap to clone; every module's [`Emitter`](crate::Emitter) holds one.
///
/// # Example
///
/// ```ignore
/// let (queue, mut receiver) = EventQueue::new();
///
/// queue.emit(Arc::new(Event::seed("example.com", EventType::DNS_NAME)))?;
///
/// let event = receiver.recv().await.unwrap();
/// assert_eq!(event.value(), "example.com");
/// ```
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::UnboundedSender<Arc<Event>>,
}

impl EventQueue {
    /// Create a new queue and its receiving half.
    pub fn new() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, EventReceiver { receiver })
    }

    /// Hand an event to the orchestrator.
    pub fn emit(&self, event: Arc<Event>) -> Result<(), EmitError> {
        self.sender.send(event).map_err(|_| EmitError::QueueClosed)
    }

    /// Whether the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving half of the event queue, owned by the orchestrator.
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<Arc<Event>>,
}

impl EventReceiver {
    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    /// Take the next event if one is ready.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.try_recv().ok()
    }

    /// Take every event that is ready right now.
    pub fn drain(&mut self) -> Vec<Arc<Event>> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}
