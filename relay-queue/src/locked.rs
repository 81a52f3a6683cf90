//! Mutex + condition variable bounded queue.
//!
//! Every operation holds the lock for its whole body, so any number of
//! producers and consumers may share one queue (wrap it in an `Arc`). The
//! condition variable is only used to wake a consumer parked in
//! [`dequeue_blocking`](LockingBoundedQueue::dequeue_blocking).
//!
//! The [`Enqueue`]/[`Dequeue`] contract is implemented for the queue and for
//! `&LockingBoundedQueue`, so scoped threads can each drive a shared
//! reference through generic code.
//!
//! # Example
//!
//! ```
//! use relay_queue::LockingBoundedQueue;
//!
//! let q = LockingBoundedQueue::new(2);
//!
//! assert!(q.enqueue('A').is_ok());
//! assert!(q.enqueue('B').is_ok());
//! assert!(q.enqueue('C').is_err());
//!
//! assert_eq!(q.dequeue(), Some('A'));
//! assert!(q.enqueue('C').is_ok());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::contract::{Dequeue, Enqueue};
use crate::{DEFAULT_CAPACITY, Full};

/// A bounded FIFO guarded by one mutex.
pub struct LockingBoundedQueue<T> {
    queue: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    max_size: usize,
}

impl<T> LockingBoundedQueue<T> {
    /// Creates an empty queue that holds at most `max_size` elements.
    pub fn new(max_size: usize) -> Self {
        tracing::debug!(max_size, "locking bounded queue created");

        Self {
            queue: Mutex::new(VecDeque::with_capacity(max_size)),
            not_empty: Condvar::new(),
            max_size,
        }
    }

    /// Locks the queue. A panic in another holder does not leave the
    /// `VecDeque` in a broken state, so poisoning is ignored.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a value and wakes one blocked consumer.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if the queue already holds `max_size` elements.
    pub fn enqueue(&self, value: T) -> Result<(), Full<T>> {
        let mut queue = self.lock();

        if queue.len() >= self.max_size {
            return Err(Full(value));
        }

        queue.push_back(value);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest element without blocking.
    pub fn dequeue(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Removes the oldest element, waiting until one is available.
    ///
    /// There is no timeout; callers that need a deadline should poll
    /// [`dequeue`](Self::dequeue) instead.
    pub fn dequeue_blocking(&self) -> T {
        let mut queue = self.lock();

        // Re-check after every wakeup, spurious ones included
        loop {
            if let Some(value) = queue.pop_front() {
                return value;
            }
            queue = self
                .not_empty
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns `true` if the queue is empty (snapshot).
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns `true` if the queue holds `max_size` elements (snapshot).
    pub fn is_full(&self) -> bool {
        self.lock().len() >= self.max_size
    }

    /// Returns the number of queued elements (snapshot).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns the configured `max_size`.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.max_size
    }
}

impl<T> Default for LockingBoundedQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T> fmt::Debug for LockingBoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockingBoundedQueue")
            .field("capacity", &self.max_size)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

macro_rules! impl_contract {
    ($target:ty) => {
        impl<T> Enqueue<T> for $target {
            #[inline]
            fn enqueue(&mut self, value: T) -> Result<(), Full<T>> {
                LockingBoundedQueue::<T>::enqueue(self, value)
            }

            #[inline]
            fn capacity(&self) -> usize {
                LockingBoundedQueue::<T>::capacity(self)
            }

            #[inline]
            fn len(&self) -> usize {
                LockingBoundedQueue::<T>::len(self)
            }

            #[inline]
            fn is_full(&self) -> bool {
                LockingBoundedQueue::<T>::is_full(self)
            }

            #[inline]
            fn is_empty(&self) -> bool {
                LockingBoundedQueue::<T>::is_empty(self)
            }
        }

        impl<T> Dequeue<T> for $target {
            #[inline]
            fn dequeue(&mut self) -> Option<T> {
                LockingBoundedQueue::<T>::dequeue(self)
            }

            #[inline]
            fn capacity(&self) -> usize {
                LockingBoundedQueue::<T>::capacity(self)
            }

            #[inline]
            fn len(&self) -> usize {
                LockingBoundedQueue::<T>::len(self)
            }

            #[inline]
            fn is_empty(&self) -> bool {
                LockingBoundedQueue::<T>::is_empty(self)
            }
        }
    };
}

impl_contract!(LockingBoundedQueue<T>);
impl_contract!(&LockingBoundedQueue<T>);
