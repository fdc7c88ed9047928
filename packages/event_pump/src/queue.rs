//! The event queue: source registry, buffered events, and the wait protocol.

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::buffer::EventBuffer;
use crate::source::SourceInner;
use crate::{Event, EventSource, SourceId, WaitTimedOut};

/// A thread-safe queue that buffers events generated by the [`EventSource`]s registered
/// with it and delivers them, in arrival order, to one consumer.
///
/// Any number of threads may emit events into the queue through its registered sources;
/// retrieval is designed around a single logical consumer, though every operation remains
/// correct if several threads retrieve concurrently - they merely race, and each event is
/// delivered to exactly one of them.
///
/// Events are delivered in the order the queue accepted them. Storage grows automatically
/// as events accumulate; an idle consumer never loses events.
///
/// # Retrieval
///
/// Three non-blocking primitives inspect the front of the queue -
/// [`next_event()`][Self::next_event] (removes), [`peek_next_event()`][Self::peek_next_event]
/// (retains) and [`drop_next_event()`][Self::drop_next_event] (removes unseen) - and two
/// blocking ones suspend the caller until an event arrives -
/// [`wait_for_event()`][Self::wait_for_event] (indefinitely) and
/// [`wait_for_event_timed()`][Self::wait_for_event_timed] /
/// [`wait_for_event_until()`][Self::wait_for_event_until] (bounded).
///
/// # Registration
///
/// A source may be registered with any number of queues simultaneously, or none.
/// Registering an already-registered source and unregistering an absent one are no-ops.
/// Unregistering a source also discards every buffered event it produced; once the call
/// returns, no retrieval will ever yield an event from that source again.
///
/// Dropping the queue unregisters every remaining source, so a queue never has to be torn
/// down manually and sources never deliver into freed storage.
///
/// # Example
///
/// ```rust
/// use std::thread;
///
/// use event_pump::{EventQueue, EventSource};
///
/// let queue = EventQueue::new();
/// let source = EventSource::new();
/// queue.register_source(&source);
///
/// let producer = thread::spawn(move || {
///     source.emit("job finished");
/// });
///
/// // Blocks until the producer's event arrives.
/// let event = queue.wait_for_event();
/// assert_eq!(*event.payload(), "job finished");
///
/// producer.join().unwrap();
/// ```
pub struct EventQueue<T> {
    inner: Arc<QueueInner<T>>,
}

/// Shared state of a queue, referenced weakly by the sources registered with it.
pub(crate) struct QueueInner<T> {
    /// All mutable queue state behind a single lock. The source registry and the buffer
    /// are updated together: unregistration removes the source and evicts its buffered
    /// events as one transaction.
    state: Mutex<QueueState<T>>,

    /// Notified on every successful enqueue. Always a broadcast: several threads may be
    /// blocked in the wait family at once and all of them are legitimate racers for the
    /// new event, so waking only one could strand the rest.
    events_available: Condvar,
}

struct QueueState<T> {
    /// Registered sources in registration order, no duplicates.
    sources: Vec<Weak<SourceInner<T>>>,

    buffer: EventBuffer<T>,
}

impl<T> QueueState<T> {
    fn contains_source(&self, source: SourceId) -> bool {
        self.sources
            .iter()
            .any(|candidate| SourceId::of(candidate) == source)
    }
}

impl<T> EventQueue<T> {
    /// Creates a new, empty queue with no registered sources.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    sources: Vec::new(),
                    buffer: EventBuffer::new(),
                }),
                events_available: Condvar::new(),
            }),
        }
    }

    /// Registers an event source with this queue, so that events the source emits from
    /// now on are delivered here.
    ///
    /// Registering a source that is already registered with this queue does nothing.
    pub fn register_source(&self, source: &EventSource<T>) {
        let source_id = source.id();

        if self.inner.state.lock().contains_source(source_id) {
            return;
        }

        // The source learns about the queue before the registry lists it, and the queue
        // lock is never held across the notification. A source notified of a queue it
        // already knows records nothing, so a racing double-register stays idempotent.
        source.inner().on_registered(Arc::downgrade(&self.inner));

        let mut state = self.inner.state.lock();
        if !state.contains_source(source_id) {
            state.sources.push(source.downgrade());
            debug!(source = ?source_id, "event source registered");
        }
    }

    /// Unregisters an event source from this queue.
    ///
    /// Every buffered event that originated from this source is discarded before the call
    /// returns, and no retrieval performed afterwards can yield an event from it - past or
    /// future. Unregistering a source that is not registered with this queue does nothing.
    pub fn unregister_source(&self, source: &EventSource<T>) {
        self.unregister_inner(source.id(), Some(source.inner()));
    }

    /// The unregistration transaction shared by [`Self::unregister_source`] and the drop
    /// path, where only a weak reference remains and `source` may already be gone.
    fn unregister_inner(&self, source_id: SourceId, source: Option<&Arc<SourceInner<T>>>) {
        let found = {
            let mut state = self.inner.state.lock();
            let count_before = state.sources.len();
            state
                .sources
                .retain(|candidate| SourceId::of(candidate) != source_id);
            state.sources.len() != count_before
        };

        if !found {
            return;
        }

        // The source stops addressing events here before eviction runs, so an emit racing
        // with this call either lands before the eviction (and is evicted) or finds the
        // queue already forgotten. Either way nothing from this source survives.
        if let Some(source) = source {
            source.on_unregistered(Arc::as_ptr(&self.inner));
        }

        let mut state = self.inner.state.lock();
        let discarded = state.buffer.discard_events_from(source_id);
        drop(state);

        debug!(source = ?source_id, discarded, "event source unregistered");
    }

    /// Whether the queue currently holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().buffer.is_empty()
    }

    /// The number of events currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    /// Removes and returns the next event, or `None` if the queue is empty.
    ///
    /// An empty queue is the expected frequent case for a polling consumer, not an error.
    #[must_use]
    pub fn next_event(&self) -> Option<Event<T>> {
        let event = self.inner.state.lock().buffer.take_next();
        if event.is_some() {
            trace!("event dequeued");
        }
        event
    }

    /// Returns a copy of the next event without removing it, or `None` if the queue is
    /// empty.
    ///
    /// The event remains at the front: a subsequent retrieval yields an equal copy.
    #[must_use]
    pub fn peek_next_event(&self) -> Option<Event<T>>
    where
        T: Clone,
    {
        self.inner.state.lock().buffer.peek().cloned()
    }

    /// Removes the next event without returning it. Returns whether an event was removed.
    pub fn drop_next_event(&self) -> bool {
        let dropped = self.inner.state.lock().buffer.take_next().is_some();
        if dropped {
            trace!("event dropped unseen");
        }
        dropped
    }

    /// Drops every buffered event. Registered sources stay registered.
    pub fn flush(&self) {
        self.inner.state.lock().buffer.clear();
        trace!("event queue flushed");
    }

    /// Blocks the calling thread until an event is available, then removes and returns it.
    ///
    /// If the queue is already non-empty this returns immediately. There is no external
    /// cancellation: a caller that may need to abandon the wait should use
    /// [`wait_for_event_timed()`][Self::wait_for_event_timed], or arrange for a dedicated
    /// sentinel event to be emitted.
    #[must_use]
    pub fn wait_for_event(&self) -> Event<T> {
        let mut state = self.inner.state.lock();

        // Wakeups can be spurious, and a broadcast wakes every waiter while only one can
        // win the event, so emptiness is re-checked on every iteration.
        while state.buffer.is_empty() {
            self.inner.events_available.wait(&mut state);
        }

        state
            .buffer
            .take_next()
            .expect("the buffer was observed non-empty and the lock has been held since")
    }

    /// Blocks the calling thread until an event is available or `timeout` elapses.
    ///
    /// Removes and returns the event on success. A zero timeout checks once and returns
    /// without blocking.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::time::Duration;
    ///
    /// use event_pump::{EventQueue, EventSource, WaitTimedOut};
    ///
    /// let queue = EventQueue::<u32>::new();
    ///
    /// // Nothing arrives, so the bounded wait reports a timeout.
    /// let outcome = queue.wait_for_event_timed(Duration::from_millis(10));
    /// assert_eq!(outcome, Err(WaitTimedOut));
    /// ```
    pub fn wait_for_event_timed(&self, timeout: Duration) -> Result<Event<T>, WaitTimedOut> {
        let deadline = Instant::now()
            .checked_add(timeout)
            .expect("wait deadline overflowed the Instant range, which requires an absurd timeout");

        self.wait_for_event_until(deadline)
    }

    /// Blocks the calling thread until an event is available or `deadline` passes.
    ///
    /// Removes and returns the event on success. A deadline at or before the current time
    /// checks once and returns without blocking.
    pub fn wait_for_event_until(&self, deadline: Instant) -> Result<Event<T>, WaitTimedOut> {
        let mut state = self.inner.state.lock();

        while state.buffer.is_empty() {
            let outcome = self
                .inner
                .events_available
                .wait_until(&mut state, deadline);

            // An event that arrived in the same instant the deadline expired still wins;
            // only a timeout observed together with an empty buffer ends the wait.
            if outcome.timed_out() && state.buffer.is_empty() {
                return Err(WaitTimedOut);
            }
        }

        Ok(state
            .buffer
            .take_next()
            .expect("the buffer was observed non-empty and the lock has been held since"))
    }
}

impl<T> QueueInner<T> {
    /// Appends an event to the buffer and wakes every thread blocked in the wait family.
    ///
    /// Invoked by registered sources, from any thread.
    pub(crate) fn push_event(&self, event: Event<T>) {
        let mut state = self.state.lock();
        state.buffer.push(event);
        trace!("event enqueued");

        self.events_available.notify_all();
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();

        f.debug_struct(type_name::<Self>())
            .field("len", &state.buffer.len())
            .field("capacity", &state.buffer.capacity())
            .field("source_count", &state.sources.len())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for EventQueue<T> {
    fn drop(&mut self) {
        // Unregister every remaining source, last-registered first. Each unregistration
        // evicts that source's buffered events, so the buffer is provably empty once the
        // registry is. A source whose handles are all gone is evicted by identity alone.
        loop {
            let candidate = self.inner.state.lock().sources.last().cloned();
            let Some(weak) = candidate else { break };

            let upgraded = weak.upgrade();
            self.unregister_inner(SourceId::of(&weak), upgraded.as_ref());
        }

        debug_assert!(
            self.inner.state.lock().buffer.is_empty(),
            "the buffer must be empty once every source is unregistered"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use static_assertions::assert_impl_all;
    use testing::with_watchdog;

    use super::*;

    assert_impl_all!(EventQueue<u32>: Send, Sync);
    assert_impl_all!(EventSource<u32>: Send, Sync);
    assert_impl_all!(Event<u32>: Send, Sync);

    #[test]
    fn new_queue_is_empty() {
        let queue = EventQueue::<u32>::new();

        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.next_event().is_none());
        assert!(queue.peek_next_event().is_none());
        assert!(!queue.drop_next_event());
    }

    #[test]
    fn emitted_events_drain_in_order() {
        let queue = EventQueue::new();
        let source = EventSource::new();
        queue.register_source(&source);

        for payload in 0..10 {
            assert!(source.emit(payload));
        }
        assert_eq!(queue.len(), 10);

        for expected in 0..10 {
            assert_eq!(queue.next_event().unwrap().into_payload(), expected);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn peek_retains_and_matches_subsequent_removal() {
        let queue = EventQueue::new();
        let source = EventSource::new();
        queue.register_source(&source);
        source.emit(7);

        let peeked = queue.peek_next_event().unwrap();
        assert_eq!(*peeked.payload(), 7);
        assert_eq!(queue.len(), 1);

        let taken = queue.next_event().unwrap();
        assert_eq!(taken, peeked);
        assert!(queue.is_empty());
    }

    #[test]
    fn drop_next_event_removes_unseen() {
        let queue = EventQueue::new();
        let source = EventSource::new();
        queue.register_source(&source);
        source.emit(1);
        source.emit(2);

        assert!(queue.drop_next_event());

        assert_eq!(queue.next_event().unwrap().into_payload(), 2);
        assert!(!queue.drop_next_event());
    }

    #[test]
    fn flush_discards_all_events_but_keeps_sources() {
        let queue = EventQueue::new();
        let source = EventSource::new();
        queue.register_source(&source);
        source.emit(1);
        source.emit(2);

        queue.flush();
        assert!(queue.is_empty());

        // The source remains registered and delivers as before.
        assert!(source.emit(3));
        assert_eq!(queue.next_event().unwrap().into_payload(), 3);
    }

    #[test]
    fn registration_is_idempotent() {
        let queue = EventQueue::new();
        let source = EventSource::new();

        queue.register_source(&source);
        queue.register_source(&source);

        assert_eq!(source.queue_count(), 1);

        // Exactly one copy of each event arrives.
        source.emit(5);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn registering_a_clone_is_registering_the_same_source() {
        let queue = EventQueue::new();
        let source = EventSource::new();
        let cloned = source.clone();

        queue.register_source(&source);
        queue.register_source(&cloned);

        source.emit(1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn unregistering_an_absent_source_is_a_noop() {
        let queue = EventQueue::new();
        let registered = EventSource::new();
        let stranger = EventSource::new();
        queue.register_source(&registered);
        registered.emit(1);

        queue.unregister_source(&stranger);

        assert_eq!(queue.len(), 1);
        assert_eq!(registered.queue_count(), 1);
    }

    #[test]
    fn unregistration_evicts_only_that_sources_events() {
        let queue = EventQueue::new();
        let doomed = EventSource::new();
        let kept = EventSource::new();
        queue.register_source(&doomed);
        queue.register_source(&kept);

        doomed.emit(100);
        kept.emit(0);
        doomed.emit(101);
        kept.emit(1);
        doomed.emit(102);
        kept.emit(2);

        queue.unregister_source(&doomed);

        let mut drained = Vec::new();
        while let Some(event) = queue.next_event() {
            assert_eq!(event.source_id(), kept.id());
            drained.push(event.into_payload());
        }
        assert_eq!(drained, vec![0, 1, 2]);
    }

    #[test]
    fn unregistration_stops_future_delivery() {
        let queue = EventQueue::new();
        let source = EventSource::new();
        queue.register_source(&source);

        queue.unregister_source(&source);

        assert!(!source.emit(1));
        assert!(queue.is_empty());
        assert_eq!(source.queue_count(), 0);
    }

    #[test]
    fn one_source_delivers_to_many_queues() {
        let first = EventQueue::new();
        let second = EventQueue::new();
        let source = EventSource::new();
        first.register_source(&source);
        second.register_source(&source);

        source.emit("shared");

        assert_eq!(first.next_event().unwrap().into_payload(), "shared");
        assert_eq!(second.next_event().unwrap().into_payload(), "shared");
    }

    #[test]
    fn dropping_the_queue_detaches_its_sources() {
        let source = EventSource::new();

        {
            let queue = EventQueue::new();
            queue.register_source(&source);
            source.emit(1);
            assert_eq!(source.queue_count(), 1);
        }

        assert_eq!(source.queue_count(), 0);
        assert!(!source.emit(2));
    }

    #[test]
    fn dropping_the_queue_drops_buffered_events() {
        let drop_count = Arc::new(AtomicUsize::new(0));
        let source = EventSource::new();

        {
            let queue = EventQueue::new();
            queue.register_source(&source);
            for _ in 0..4 {
                source.emit(CountsDrops(Arc::clone(&drop_count)));
            }
            // Emitting clones per delivery; only the buffered copies concern us here.
            drop_count.store(0, Ordering::SeqCst);
        }

        assert_eq!(drop_count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn events_survive_their_source_until_unregistration() {
        let queue = EventQueue::new();
        let source = EventSource::new();
        queue.register_source(&source);
        source.emit(9);

        drop(source);

        // The buffered event is still delivered; only its source handle is gone.
        let event = queue.next_event().unwrap();
        assert_eq!(event.into_payload(), 9);
    }

    #[test]
    fn queue_with_dead_source_drops_cleanly() {
        let queue = EventQueue::new();
        let source = EventSource::new();
        queue.register_source(&source);
        source.emit(1);

        drop(source);
        drop(queue);
    }

    #[test]
    fn wait_timed_on_empty_queue_times_out_immediately() {
        let queue = EventQueue::<u32>::new();

        assert_eq!(
            queue.wait_for_event_timed(Duration::ZERO),
            Err(WaitTimedOut)
        );
    }

    #[test]
    fn wait_until_with_past_deadline_does_not_block() {
        let queue = EventQueue::<u32>::new();

        assert_eq!(queue.wait_for_event_until(Instant::now()), Err(WaitTimedOut));
    }

    #[test]
    fn wait_returns_immediately_when_event_is_already_buffered() {
        let queue = EventQueue::new();
        let source = EventSource::new();
        queue.register_source(&source);
        source.emit(3);

        assert_eq!(queue.wait_for_event().into_payload(), 3);
        assert_eq!(
            queue.wait_for_event_timed(Duration::ZERO),
            Err(WaitTimedOut)
        );
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn wait_wakes_when_producer_emits() {
        with_watchdog(|| {
            let queue = EventQueue::new();
            let source = EventSource::new();
            queue.register_source(&source);

            let producer = thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                source.emit(11);
            });

            assert_eq!(queue.wait_for_event().into_payload(), 11);

            producer.join().unwrap();
        });
    }

    struct CountsDrops(Arc<AtomicUsize>);

    impl Clone for CountsDrops {
        fn clone(&self) -> Self {
            Self(Arc::clone(&self.0))
        }
    }

    impl Drop for CountsDrops {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}
