//! # relay-queue
//!
//! Three bounded queue designs for handing fixed-size records from a producer
//! thread to a consumer thread.
//!
//! ## Designs
//!
//! | Module | Type | Synchronization | Producers / consumers |
//! |--------|------|-----------------|-----------------------|
//! | [`ring`] | [`RingBufferQueue`] | acquire/release indices | 1 / 1 |
//! | [`locked`] | [`LockingBoundedQueue`] | mutex + condvar | any / any |
//! | [`double_buffer`] | [`DoubleBufferQueue`] | batch publish by role swap | 1 / 1 |
//!
//! All three speak the same structural contract, expressed by the
//! [`Enqueue`] and [`Dequeue`] traits. The traits are meant for generic
//! (monomorphized) code; nothing here goes through a vtable.
//!
//! Capacity exhaustion and emptiness are ordinary outcomes, not errors:
//! `enqueue` hands the value back in [`Full`], `dequeue` returns `None`.
//! Retry policy (spin, yield, sleep, drop) is the caller's business.
//!
//! ## Example
//!
//! ```
//! use relay_queue::ring::RingBufferQueue;
//!
//! // 8 slots, 7 usable
//! let (mut tx, mut rx) = RingBufferQueue::<u64, 8>::new();
//!
//! tx.enqueue(42).unwrap();
//! assert_eq!(rx.dequeue(), Some(42));
//! assert_eq!(rx.dequeue(), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod contract;
pub mod double_buffer;
pub mod locked;
pub mod ring;

use std::fmt;

pub use contract::{Dequeue, Enqueue};
pub use double_buffer::{DoubleBufferQueue, SwapError};
pub use locked::LockingBoundedQueue;
pub use ring::RingBufferQueue;

/// Capacity used by the runtime-sized queues when none is given.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Returned by `enqueue` when there is no room for the value.
///
/// Carries the rejected value back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be enqueued.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T: fmt::Debug> std::error::Error for Full<T> {}
