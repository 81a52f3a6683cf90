//! The structural contract shared by every queue design.
//!
//! Each design keeps its own inherent methods; these traits only exist so
//! generic drivers (benchmarks, stress tests) can be written once and
//! monomorphized per queue. Use them as bounds, not as trait objects.

use crate::Full;

/// Producer side of a bounded queue.
pub trait Enqueue<T> {
    /// Attempts to append a value.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` when the queue (or write buffer) has no room.
    fn enqueue(&mut self, value: T) -> Result<(), Full<T>>;

    /// Maximum number of elements the queue accepts.
    fn capacity(&self) -> usize;

    /// Number of elements currently held (snapshot).
    fn len(&self) -> usize;

    /// Returns `true` if an `enqueue` would be rejected right now (snapshot).
    fn is_full(&self) -> bool;

    /// Returns `true` if the queue holds nothing (snapshot).
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer side of a bounded queue.
pub trait Dequeue<T> {
    /// Removes the oldest available value.
    fn dequeue(&mut self) -> Option<T>;

    /// Maximum number of elements the queue accepts.
    fn capacity(&self) -> usize;

    /// Number of elements currently readable (snapshot).
    fn len(&self) -> usize;

    /// Returns `true` if nothing is readable (snapshot).
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` while a `dequeue` could still succeed.
    ///
    /// Consumers use this together with a producer-done flag to decide when
    /// draining is finished.
    #[inline]
    fn has_data(&self) -> bool {
        !self.is_empty()
    }

    /// Out-parameter form of [`dequeue`](Dequeue::dequeue).
    ///
    /// Writes into `slot` and returns `true` on success; leaves `slot`
    /// untouched and returns `false` when empty.
    #[inline]
    fn dequeue_into(&mut self, slot: &mut T) -> bool {
        match self.dequeue() {
            Some(value) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}
