//! Error types of this crate.

use thiserror::Error;

/// A bounded wait elapsed before any event arrived.
///
/// Returned by [`EventQueue::wait_for_event_timed()`][crate::EventQueue::wait_for_event_timed]
/// and [`EventQueue::wait_for_event_until()`][crate::EventQueue::wait_for_event_until].
///
/// Timing out is an expected outcome of a bounded wait, not a failure of the queue; it is
/// a distinct type only so it cannot be confused with the `None` that non-blocking
/// retrieval yields on an empty queue.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("timed out waiting for an event to arrive in the queue")]
#[expect(clippy::exhaustive_structs, reason = "intentionally an empty struct")]
pub struct WaitTimedOut;
