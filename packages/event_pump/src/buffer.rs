//! Circular storage for buffered events.

use tracing::debug;

use crate::{Event, SourceId};

/// A growable circular buffer of event slots.
///
/// The capacity is always a power of two and one slot is always kept vacant, so
/// `head == tail` unambiguously means empty without a separate occupancy counter. The
/// occupied region is the cyclic index range `[tail, head)`; every slot inside it holds an
/// event and every slot outside it is `None`, so abandoned events are dropped the moment
/// they leave the occupied region.
///
/// All operations assume the caller already holds the owning queue's lock; the buffer
/// itself performs no synchronization.
pub(crate) struct EventBuffer<T> {
    slots: Vec<Option<Event<T>>>,

    /// Index of the next slot to write; exclusive end of the occupied region.
    head: usize,

    /// Index of the next slot to read; inclusive start of the occupied region.
    tail: usize,
}

impl<T> EventBuffer<T> {
    /// Creates an empty buffer with a single (vacant) slot, the smallest capacity that
    /// satisfies the one-vacant-slot rule. The first push grows it.
    pub(crate) fn new() -> Self {
        Self {
            slots: vec![None],
            head: 0,
            tail: 0,
        }
    }

    // Can only be mutated into hanging the blocking-wait tests, which the watchdog does
    // not guard under mutation testing.
    #[cfg_attr(test, mutants::skip)]
    pub(crate) fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub(crate) fn len(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.capacity() - self.tail + self.head
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    /// Appends an event at the write end, growing the buffer first if the write would
    /// leave no slot vacant.
    pub(crate) fn push(&mut self, event: Event<T>) {
        let mut next = self.next_index(self.head);
        if next == self.tail {
            self.expand();
            next = self.next_index(self.head);
        }

        let slot = self
            .slots
            .get_mut(self.head)
            .expect("head always lies within the slot array");
        debug_assert!(slot.is_none(), "the write slot must be vacant");
        *slot = Some(event);

        self.head = next;
    }

    /// Doubles the capacity, preserving the read order of the buffered events.
    ///
    /// New slots are appended after the existing ones. If the occupied region wraps past
    /// the end of the array (`head < tail`), the wrapped prefix `[0, head)` moves into the
    /// newly appended slots so the region reads contiguously again; the unwrapped segment
    /// `[tail, old capacity)` never moves. Cost is proportional to the wrapped prefix,
    /// amortized constant per push over the buffer's lifetime.
    fn expand(&mut self) {
        let old_capacity = self.slots.len();
        let new_capacity = old_capacity
            .checked_mul(2)
            .expect("capacity doubling overflowed usize, which memory exhaustion prevents");

        self.slots.resize_with(new_capacity, || None);

        if self.head < self.tail {
            for index in 0..self.head {
                let relocated = self
                    .slots
                    .get_mut(index)
                    .expect("wrapped prefix indices lie within the old capacity")
                    .take();
                *self
                    .slots
                    .get_mut(old_capacity + index)
                    .expect("relocation targets lie within the new capacity") = relocated;
            }

            self.head += old_capacity;
        }

        debug!(old_capacity, new_capacity, "event buffer expanded");
    }

    /// The event at the read end, without removing it.
    pub(crate) fn peek(&self) -> Option<&Event<T>> {
        if self.is_empty() {
            return None;
        }

        let slot = self
            .slots
            .get(self.tail)
            .expect("tail always lies within the slot array");
        Some(
            slot.as_ref()
                .expect("slots in the occupied region always hold an event"),
        )
    }

    /// Removes and returns the event at the read end.
    pub(crate) fn take_next(&mut self) -> Option<Event<T>> {
        if self.is_empty() {
            return None;
        }

        let event = self
            .slots
            .get_mut(self.tail)
            .expect("tail always lies within the slot array")
            .take()
            .expect("slots in the occupied region always hold an event");

        self.tail = self.next_index(self.tail);

        Some(event)
    }

    /// Drops every buffered event and resets the indices.
    pub(crate) fn clear(&mut self) {
        let mut index = self.tail;
        while index != self.head {
            *self
                .slots
                .get_mut(index)
                .expect("occupied region indices lie within the slot array") = None;
            index = self.next_index(index);
        }

        self.head = 0;
        self.tail = 0;
    }

    fn contains_event_from(&self, source: SourceId) -> bool {
        let mut index = self.tail;
        while index != self.head {
            let event = self
                .slots
                .get(index)
                .expect("occupied region indices lie within the slot array")
                .as_ref()
                .expect("slots in the occupied region always hold an event");

            if event.source_id() == source {
                return true;
            }

            index = self.next_index(index);
        }

        false
    }

    /// Removes every buffered event attributable to `source`, preserving the relative
    /// order of the remaining events, and returns how many were removed.
    ///
    /// When nothing matches, this is a single scan with no allocation. Otherwise the kept
    /// events are rebuilt into a fresh slot array sized to the smallest power of two that
    /// restores the one-vacant-slot rule. Cost is proportional to current occupancy; this
    /// runs only when a source is unregistered.
    pub(crate) fn discard_events_from(&mut self, source: SourceId) -> usize {
        if !self.contains_event_from(source) {
            return 0;
        }

        let occupancy = self.len();
        let mut kept = Vec::with_capacity(occupancy);

        let mut index = self.tail;
        while index != self.head {
            let event = self
                .slots
                .get_mut(index)
                .expect("occupied region indices lie within the slot array")
                .take()
                .expect("slots in the occupied region always hold an event");

            if event.source_id() != source {
                kept.push(event);
            }

            index = self.next_index(index);
        }

        let kept_count = kept.len();
        let discarded = occupancy - kept_count;

        let new_capacity = kept_count
            .checked_add(1)
            .expect("occupancy is below usize::MAX by the one-vacant-slot rule")
            .next_power_of_two();

        let mut slots = kept.into_iter().map(Some).collect::<Vec<_>>();
        slots.resize_with(new_capacity, || None);

        self.slots = slots;
        self.tail = 0;
        self.head = kept_count;

        debug!(source = ?source, discarded, kept = kept_count, "discarded buffered events of source");

        discarded
    }
}
