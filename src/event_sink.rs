//! Callback surface the [`crate::ReliabilityManager`] invokes on state
//! transitions. Every method is called with the Manager's lock held;
//! implementations must not re-enter the same Manager (that deadlocks) and
//! must not block — post to a queue if asynchronous handling is needed.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::ids::MessageId;

pub trait EventSink: Send {
    /// A received message became deliverable.
    fn message_ready(&mut self, id: &MessageId);

    /// An outbound entry was acknowledged, or gave up after exhausting
    /// `max_resend_attempts`.
    fn message_sent(&mut self, id: &MessageId);

    /// A received message is pending; `ids` is in causal-history order.
    fn missing_dependencies(&mut self, id: &MessageId, ids: &[MessageId]);

    /// Advisory periodic sync tick; the embedder decides whether to emit a
    /// sync message on the transport.
    fn periodic_sync(&mut self);
}

/// An [`EventSink`] that drops every event; useful for managers that are
/// only wrapping/unwrapping without caring about callbacks (e.g. tests).
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn message_ready(&mut self, _id: &MessageId) {}
    fn message_sent(&mut self, _id: &MessageId) {}
    fn missing_dependencies(&mut self, _id: &MessageId, _ids: &[MessageId]) {}
    fn periodic_sync(&mut self) {}
}

/// An [`EventSink`] that records every call, in order, for assertions in
/// tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    pub events: Vec<RecordedEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    MessageReady(MessageId),
    MessageSent(MessageId),
    MissingDependencies(MessageId, Vec<MessageId>),
    PeriodicSync,
}

impl EventSink for RecordingEventSink {
    fn message_ready(&mut self, id: &MessageId) {
        self.events.push(RecordedEvent::MessageReady(id.clone()));
    }

    fn message_sent(&mut self, id: &MessageId) {
        self.events.push(RecordedEvent::MessageSent(id.clone()));
    }

    fn missing_dependencies(&mut self, id: &MessageId, ids: &[MessageId]) {
        self.events
            .push(RecordedEvent::MissingDependencies(id.clone(), ids.to_vec()));
    }

    fn periodic_sync(&mut self) {
        self.events.push(RecordedEvent::PeriodicSync);
    }
}

/// A clonable [`EventSink`] that records into a shared buffer, so a test can
/// keep a handle to read fired events after handing the sink's other half to
/// a [`crate::ReliabilityManager`].
#[derive(Debug, Clone, Default)]
pub struct SharedRecordingSink {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl SharedRecordingSink {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for SharedRecordingSink {
    fn message_ready(&mut self, id: &MessageId) {
        self.events.lock().push(RecordedEvent::MessageReady(id.clone()));
    }

    fn message_sent(&mut self, id: &MessageId) {
        self.events.lock().push(RecordedEvent::MessageSent(id.clone()));
    }

    fn missing_dependencies(&mut self, id: &MessageId, ids: &[MessageId]) {
        self.events
            .lock()
            .push(RecordedEvent::MissingDependencies(id.clone(), ids.to_vec()));
    }

    fn periodic_sync(&mut self) {
        self.events.lock().push(RecordedEvent::PeriodicSync);
    }
}
