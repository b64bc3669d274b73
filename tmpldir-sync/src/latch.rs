//! Single-slot failure register shared by the render workers.
//!
//! The first error offered wins; every later one is discarded. Nothing here
//! waits on a lock: the winner is picked by one atomic compare-exchange and
//! is the only thread that ever writes the slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

#[derive(Debug)]
pub struct ErrorLatch<E> {
    claimed: AtomicBool,
    slot: OnceLock<E>,
}

impl<E> ErrorLatch<E> {
    pub fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            slot: OnceLock::new(),
        }
    }

    /// Offer `err`. Returns `true` if it was retained, `false` if another
    /// error got there first.
    pub fn try_set(&self, err: E) -> bool {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // Only the thread that won the claim reaches this point.
        let _ = self.slot.set(err);
        true
    }

    /// Latch the error of a failed step. Returns `true` when the caller
    /// should stop.
    pub fn fail_on<T>(&self, result: Result<T, E>) -> bool {
        match result {
            Ok(_) => false,
            Err(err) => {
                self.try_set(err);
                true
            }
        }
    }

    /// Whether a failure has been latched during this run.
    pub fn is_set(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Take the retained error. Later calls return `None`.
    pub fn drain(&mut self) -> Option<E> {
        self.slot.take()
    }
}

impl<E> Default for ErrorLatch<E> {
    fn default() -> Self {
        Self::new()
    }
}
