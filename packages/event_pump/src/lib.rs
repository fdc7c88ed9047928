//! Thread-safe event queues that aggregate events from registered event sources.
//!
//! An [`EventQueue<T>`] buffers events generated by the [`EventSource<T>`]s registered
//! with it and delivers them, in arrival order, to one consumer thread. Producers may run
//! on any number of threads; each [`EventSource::emit()`] delivers one event to every
//! queue the source is registered with and wakes any threads blocked waiting on them.
//!
//! The consumer side offers non-blocking polling ([`EventQueue::next_event()`],
//! [`EventQueue::peek_next_event()`], [`EventQueue::drop_next_event()`]), an unbounded
//! blocking wait ([`EventQueue::wait_for_event()`]) and bounded waits
//! ([`EventQueue::wait_for_event_timed()`], [`EventQueue::wait_for_event_until()`]).
//!
//! Storage grows automatically as events accumulate, so producers never block on a slow
//! consumer and no event is ever lost. Unregistering a source atomically discards its
//! buffered events while preserving the order of everything else.
//!
//! # Quick start
//!
//! ```rust
//! use std::thread;
//!
//! use event_pump::{EventQueue, EventSource};
//!
//! let queue = EventQueue::new();
//! let source = EventSource::new();
//! queue.register_source(&source);
//!
//! let producer = thread::spawn(move || {
//!     for step in 0..3 {
//!         source.emit(step);
//!     }
//! });
//!
//! for expected in 0..3 {
//!     let event = queue.wait_for_event();
//!     assert_eq!(*event.payload(), expected);
//! }
//!
//! producer.join().unwrap();
//! ```
//!
//! # Ordering
//!
//! Events are delivered in the order the queue accepted them. When producers on several
//! threads race, acceptance order is the order their deliveries acquired the queue's
//! internal lock; events from any single source are never reordered relative to each
//! other.

mod buffer;
mod error;
mod event;
mod queue;
mod source;

pub use error::*;
pub use event::*;
pub use queue::*;
pub use source::*;
