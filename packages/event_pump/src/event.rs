//! The event record type delivered through queues.

use std::any::type_name;
use std::fmt;
use std::sync::Weak;

use crate::{EventSource, SourceId};
use crate::source::SourceInner;

/// A single occurrence delivered through an [`EventQueue`][crate::EventQueue].
///
/// An event pairs a caller-defined payload with a back-reference to the
/// [`EventSource`][crate::EventSource] that produced it. The back-reference carries no
/// ownership - it exists so events can be attributed to their source, which the queue relies
/// on when a source is unregistered and its buffered events are discarded.
///
/// Events are plain values: they are moved into the queue when emitted and moved out when
/// retrieved, and can be cloned when the payload can.
///
/// # Example
///
/// ```rust
/// use event_pump::{EventQueue, EventSource};
///
/// let queue = EventQueue::new();
/// let source = EventSource::new();
/// queue.register_source(&source);
///
/// source.emit("ping");
///
/// let event = queue.next_event().unwrap();
/// assert_eq!(*event.payload(), "ping");
/// assert_eq!(event.source_id(), source.id());
/// ```
#[derive(Clone)]
pub struct Event<T> {
    /// Identity-only back-reference to the shared state of the producing source.
    source: Weak<SourceInner<T>>,

    payload: T,
}

impl<T> Event<T> {
    pub(crate) fn new(source: Weak<SourceInner<T>>, payload: T) -> Self {
        Self { source, payload }
    }

    /// The payload carried by this event.
    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// The payload carried by this event, mutably.
    #[must_use]
    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    /// Consumes the event, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// The identity of the source that produced this event.
    ///
    /// Valid for comparison against [`EventSource::id()`] as long as the producing source
    /// has not been dropped; see [`SourceId`] for the lifetime contract.
    #[must_use]
    pub fn source_id(&self) -> SourceId {
        SourceId::of(&self.source)
    }

    /// A handle to the source that produced this event, if the source is still alive.
    #[must_use]
    pub fn source(&self) -> Option<EventSource<T>> {
        self.source.upgrade().map(EventSource::from_inner)
    }
}

/// Two events are equal when they carry equal payloads produced by the same source.
impl<T> PartialEq for Event<T>
where
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.source_id() == other.source_id() && self.payload == other.payload
    }
}

impl<T> Eq for Event<T> where T: Eq {}

impl<T> fmt::Debug for Event<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("source", &self.source_id())
            .field("payload", &self.payload)
            .finish()
    }
}
