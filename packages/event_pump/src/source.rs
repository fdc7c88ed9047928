//! Event sources and their identity.

use std::any::type_name;
use std::fmt;
use std::ptr;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::Event;
use crate::queue::QueueInner;

/// The identity of an [`EventSource`], used to attribute events to the source that
/// produced them.
///
/// All clones of one source handle share the same identity; independently created sources
/// have distinct identities. Identities can be compared and hashed but are otherwise opaque.
///
/// # Lifetime contract
///
/// An identity is derived from the address of the source's shared state, so it is only
/// meaningful while that source is alive. Unregister a source from every queue before
/// dropping its last handle - a source created afterwards may otherwise be assigned the
/// same identity. The queue itself never dereferences a source through its identity; this
/// contract exists purely so identity comparisons remain unambiguous for callers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SourceId(usize);

impl SourceId {
    pub(crate) fn of<T>(source: &Weak<SourceInner<T>>) -> Self {
        Self(Weak::as_ptr(source).addr())
    }
}

/// Shared state of an event source: the queues the source is currently registered with,
/// in registration order.
///
/// Queues hold only weak references to this state and this state holds only weak
/// references to queues; neither side owns the other. The paired registration and
/// unregistration notifications keep the two sides consistent.
pub(crate) struct SourceInner<T> {
    queues: Mutex<Vec<Weak<QueueInner<T>>>>,
}

impl<T> SourceInner<T> {
    fn new() -> Self {
        Self {
            queues: Mutex::new(Vec::new()),
        }
    }

    /// Invoked by a queue that has accepted this source's registration.
    ///
    /// From this point on, every emitted event is also addressed to that queue. A queue
    /// already known to this source is not recorded twice, so a racing double-register
    /// keeps set semantics on both sides.
    pub(crate) fn on_registered(&self, queue: Weak<QueueInner<T>>) {
        let mut queues = self.queues.lock();

        if queues
            .iter()
            .any(|candidate| ptr::eq(Weak::as_ptr(candidate), Weak::as_ptr(&queue)))
        {
            return;
        }

        queues.push(queue);
    }

    /// Invoked by a queue that is unregistering this source, including while the queue is
    /// being dropped - hence identification by address rather than by reference counting.
    pub(crate) fn on_unregistered(&self, queue: *const QueueInner<T>) {
        self.queues
            .lock()
            .retain(|candidate| !ptr::eq(Weak::as_ptr(candidate), queue));
    }
}

/// A producer of events that can be registered with any number of
/// [`EventQueue`][crate::EventQueue]s simultaneously, or none.
///
/// [`emit()`][Self::emit] delivers one event to every queue the source is currently
/// registered with. Handles are cheap to clone; all clones refer to the same source.
///
/// A source does not own the queues it is registered with and queues do not own their
/// sources. Dropping a queue detaches it from its sources automatically; dropping a source
/// is the caller's responsibility to sequence after unregistration (see [`SourceId`]).
///
/// # Example
///
/// ```rust
/// use event_pump::{EventQueue, EventSource};
///
/// let queue = EventQueue::new();
/// let source = EventSource::new();
///
/// // A source with no queues delivers to nobody.
/// assert!(!source.emit(1));
///
/// queue.register_source(&source);
/// assert!(source.emit(2));
///
/// assert_eq!(queue.next_event().unwrap().into_payload(), 2);
/// ```
pub struct EventSource<T> {
    inner: Arc<SourceInner<T>>,
}

impl<T> EventSource<T> {
    /// Creates a new source, not yet registered with any queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SourceInner::new()),
        }
    }

    pub(crate) fn from_inner(inner: Arc<SourceInner<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<SourceInner<T>> {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> Weak<SourceInner<T>> {
        Arc::downgrade(&self.inner)
    }

    /// The identity of this source; see [`SourceId`].
    #[must_use]
    pub fn id(&self) -> SourceId {
        SourceId(Arc::as_ptr(&self.inner).addr())
    }

    /// The number of queues this source is currently registered with.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.inner.queues.lock().len()
    }
}

impl<T> EventSource<T>
where
    T: Clone,
{
    /// Delivers one event carrying `payload` to every queue this source is currently
    /// registered with, waking any threads blocked waiting on those queues.
    ///
    /// Each queue receives its own copy of the event. Returns whether at least one queue
    /// received it; with no registered queues the payload is dropped and `false` returned.
    ///
    /// May be called from any thread. Deliveries of concurrent `emit` calls are serialized
    /// per queue; the order in which a queue accepted the events is the order it yields
    /// them.
    pub fn emit(&self, payload: T) -> bool {
        // The queue list stays locked across the deliveries so that an unregistration
        // cannot interleave mid-emit: once unregister_source returns, this source's
        // events are gone from that queue and no further emit can reach it.
        let queues = self.inner.queues.lock();

        let live = queues
            .iter()
            .filter_map(Weak::upgrade)
            .collect::<Vec<_>>();

        let Some((last, rest)) = live.split_last() else {
            trace!(source = ?self.id(), "event emitted with no registered queues");
            return false;
        };

        for queue in rest {
            queue.push_event(Event::new(self.downgrade(), payload.clone()));
        }

        // The final delivery takes the original payload instead of a copy.
        last.push_event(Event::new(self.downgrade(), payload));

        true
    }
}

impl<T> Clone for EventSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for EventSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("id", &self.id())
            .field("queue_count", &self.queue_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_queues_returns_false() {
        let source = EventSource::new();

        assert!(!source.emit(42));
    }

    #[test]
    fn clones_share_identity() {
        let source = EventSource::<u32>::new();
        let cloned = source.clone();

        assert_eq!(source.id(), cloned.id());
    }

    #[test]
    fn distinct_sources_have_distinct_identities() {
        let first = EventSource::<u32>::new();
        let second = EventSource::<u32>::new();

        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn new_source_is_registered_nowhere() {
        let source = EventSource::<u32>::new();

        assert_eq!(source.queue_count(), 0);
    }

    #[test]
    fn duplicate_registration_notification_is_ignored() {
        let source = EventSource::<u32>::new();
        let other = EventSource::<u32>::new();

        // Feed the source the same queue reference twice; only one may be recorded,
        // otherwise every emit would be delivered twice to that queue.
        let fake_queue = Weak::new();
        source.inner().on_registered(fake_queue.clone());
        source.inner().on_registered(fake_queue);

        assert_eq!(source.queue_count(), 1);
        assert_eq!(other.queue_count(), 0);
    }
}
