//! Lock-free SPSC ring buffer with a compile-time capacity.
//!
//! Two indices, each on its own cache line:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ head: consumer read index   (CachePadded)    │
//! ├──────────────────────────────────────────────┤
//! │ tail: producer write index  (CachePadded)    │
//! ├──────────────────────────────────────────────┤
//! │ buffer: N slots                              │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Both indices stay in `[0, N)` and advance with `& (N - 1)`. One slot is
//! always left empty so that `head == tail` means empty and
//! `(tail + 1) & (N - 1) == head` means full; usable capacity is `N - 1`.
//!
//! # Memory ordering
//!
//! ```text
//! Producer                             Consumer
//! ────────────────────────             ────────────────────────
//! load(head, Acquire)   <──────────┐   load(tail, Acquire)  <──┐
//! write buffer[tail]               │   read buffer[head]       │
//! store(tail, Release)  ───────────┼──────────────────────────>┘
//!                                  └── store(head, Release)
//! ```
//!
//! The release store of `tail` publishes the slot write; the consumer's
//! acquire load of `tail` makes it visible before the slot is read. The
//! mirror pair on `head` guarantees a slot is fully moved out before the
//! producer overwrites it. Each side keeps its own index locally and a cached
//! copy of the other side's index, so the acquire load only happens when the
//! cached copy says full (producer) or empty (consumer).
//!
//! # Example
//!
//! ```
//! use relay_queue::ring::RingBufferQueue;
//!
//! let (mut tx, mut rx) = RingBufferQueue::<u32, 4>::new();
//! assert_eq!(tx.capacity(), 3);
//!
//! tx.enqueue(1).unwrap();
//! tx.enqueue(2).unwrap();
//! tx.enqueue(3).unwrap();
//! assert!(tx.enqueue(4).is_err());
//!
//! assert_eq!(rx.dequeue(), Some(1));
//! ```
//!
//! # Compile-Time Enforcement
//!
//! Non-power-of-2 slot counts fail to compile:
//! ```compile_fail
//! use relay_queue::ring::RingBufferQueue;
//! let (tx, rx) = RingBufferQueue::<u64, 100>::new(); // ERROR: 100 is not a power of 2
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::Full;
use crate::contract::{Dequeue, Enqueue};

/// Fixed-capacity SPSC ring buffer of `N` slots.
///
/// `N` must be a power of two and at least 2 (enforced at compile time).
/// The queue itself is never handed out; [`RingBufferQueue::new`] returns the
/// two halves, which share it through an `Arc` so its address never changes
/// while both threads use it.
#[repr(C)]
pub struct RingBufferQueue<T, const N: usize> {
    /// Consumer's read position.
    head: CachePadded<AtomicUsize>,
    /// Producer's write position.
    tail: CachePadded<AtomicUsize>,
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Safety: a slot is only ever touched by the side that owns it according to
// head/tail, and ownership is handed over with release/acquire pairs.
unsafe impl<T: Send, const N: usize> Send for RingBufferQueue<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for RingBufferQueue<T, N> {}

impl<T, const N: usize> RingBufferQueue<T, N> {
    /// Index mask. Compile-time constant.
    const MASK: usize = N - 1;

    const _ASSERT_POW2: () = assert!(
        N >= 2 && N.is_power_of_two(),
        "N must be a power of 2 and at least 2"
    );

    /// Number of elements the queue can hold: `N - 1`.
    pub const CAPACITY: usize = N - 1;

    /// Creates a new ring buffer, returning `(Producer, Consumer)`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Producer<T, N>, Consumer<T, N>) {
        // Force the compile-time assertion to be evaluated
        let () = Self::_ASSERT_POW2;

        let buffer = (0..N)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        let shared = Arc::new(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            buffer,
        });

        tracing::debug!(slots = N, capacity = Self::CAPACITY, "ring buffer queue created");

        (
            Producer {
                shared: Arc::clone(&shared),
                tail: 0,
                cached_head: 0,
            },
            Consumer {
                shared,
                head: 0,
                cached_tail: 0,
            },
        )
    }

    #[inline]
    fn slot(&self, index: usize) -> *mut MaybeUninit<T> {
        debug_assert!(index < N);
        // Safety: index is always masked to [0, N)
        unsafe { self.buffer.get_unchecked(index).get() }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    #[inline]
    fn is_full(&self) -> bool {
        let tail = self.tail.load(Ordering::Acquire);
        ((tail + 1) & Self::MASK) == self.head.load(Ordering::Acquire)
    }

    #[inline]
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) & Self::MASK
    }
}

impl<T, const N: usize> Drop for RingBufferQueue<T, N> {
    fn drop(&mut self) {
        let mut head = *self.head.get_mut();
        let tail = *self.tail.get_mut();

        // Drop remaining elements
        while head != tail {
            unsafe { self.buffer[head].get_mut().assume_init_drop() };
            head = (head + 1) & Self::MASK;
        }
    }
}

/// Producer half of a [`RingBufferQueue`].
pub struct Producer<T, const N: usize> {
    shared: Arc<RingBufferQueue<T, N>>,
    /// Our write position (authoritative, only we update it).
    tail: usize,
    /// Last observed consumer position. Refreshed only when we look full.
    cached_head: usize,
}

impl<T, const N: usize> Producer<T, N> {
    const MASK: usize = N - 1;

    /// Attempts to enqueue a value.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if all `N - 1` usable slots are occupied.
    #[inline]
    pub fn enqueue(&mut self, value: T) -> Result<(), Full<T>> {
        let tail = self.tail;
        let next = (tail + 1) & Self::MASK;

        // Fast path: cached head says there is room
        if next != self.cached_head {
            self.publish(tail, next, value);
            return Ok(());
        }

        self.enqueue_slow(tail, next, value)
    }

    #[cold]
    fn enqueue_slow(&mut self, tail: usize, next: usize, value: T) -> Result<(), Full<T>> {
        // Pairs with the consumer's release of head: the freed slot is ours
        self.cached_head = self.shared.head.load(Ordering::Acquire);

        if next == self.cached_head {
            return Err(Full(value));
        }

        self.publish(tail, next, value);
        Ok(())
    }

    #[inline]
    fn publish(&mut self, tail: usize, next: usize, value: T) {
        // Safety: slot `tail` is outside [head, tail) so the consumer won't read it
        unsafe { (*self.shared.slot(tail)).write(value) };
        self.shared.tail.store(next, Ordering::Release);
        self.tail = next;
    }

    /// Returns the usable capacity, `N - 1`.
    #[inline]
    pub const fn capacity(&self) -> usize {
        RingBufferQueue::<T, N>::CAPACITY
    }

    /// Returns the number of queued elements (snapshot, may be stale).
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Returns `true` if the queue is empty (snapshot).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Returns `true` if the queue is full (snapshot).
    #[inline]
    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }
}

impl<T, const N: usize> fmt::Debug for Producer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Consumer half of a [`RingBufferQueue`].
pub struct Consumer<T, const N: usize> {
    shared: Arc<RingBufferQueue<T, N>>,
    /// Our read position (authoritative, only we update it).
    head: usize,
    /// Last observed producer position. Refreshed only when we look empty.
    cached_tail: usize,
}

impl<T, const N: usize> Consumer<T, N> {
    const MASK: usize = N - 1;

    /// Removes the oldest element, or returns `None` if the queue is empty.
    #[inline]
    pub fn dequeue(&mut self) -> Option<T> {
        let head = self.head;

        // Fast path: cached tail says there is data
        if head != self.cached_tail {
            return Some(self.take(head));
        }

        self.dequeue_slow(head)
    }

    #[cold]
    fn dequeue_slow(&mut self, head: usize) -> Option<T> {
        // Pairs with the producer's release of tail: the slot write is visible
        self.cached_tail = self.shared.tail.load(Ordering::Acquire);

        if head == self.cached_tail {
            return None;
        }

        Some(self.take(head))
    }

    #[inline]
    fn take(&mut self, head: usize) -> T {
        // Safety: slot `head` is inside [head, tail), initialized and ours
        let value = unsafe { (*self.shared.slot(head)).assume_init_read() };
        let next = (head + 1) & Self::MASK;
        self.shared.head.store(next, Ordering::Release);
        self.head = next;
        value
    }

    /// Returns the usable capacity, `N - 1`.
    #[inline]
    pub const fn capacity(&self) -> usize {
        RingBufferQueue::<T, N>::CAPACITY
    }

    /// Returns the number of queued elements (snapshot, may be stale).
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Returns `true` if the queue is empty (snapshot).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Returns `true` if the queue is full (snapshot).
    #[inline]
    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }
}

impl<T, const N: usize> fmt::Debug for Consumer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T, const N: usize> Enqueue<T> for Producer<T, N> {
    #[inline]
    fn enqueue(&mut self, value: T) -> Result<(), Full<T>> {
        Self::enqueue(self, value)
    }

    #[inline]
    fn capacity(&self) -> usize {
        Self::capacity(self)
    }

    #[inline]
    fn len(&self) -> usize {
        Self::len(self)
    }

    #[inline]
    fn is_full(&self) -> bool {
        Self::is_full(self)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }
}

impl<T, const N: usize> Dequeue<T> for Consumer<T, N> {
    #[inline]
    fn dequeue(&mut self) -> Option<T> {
        Self::dequeue(self)
    }

    #[inline]
    fn capacity(&self) -> usize {
        Self::capacity(self)
    }

    #[inline]
    fn len(&self) -> usize {
        Self::len(self)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_enqueue_dequeue() {
        let (mut tx, mut rx) = RingBufferQueue::<u64, 8>::new();

        tx.enqueue(1).unwrap();
        tx.enqueue(2).unwrap();
        tx.enqueue(3).unwrap();

        assert_eq!(rx.dequeue(), Some(1));
        assert_eq!(rx.dequeue(), Some(2));
        assert_eq!(rx.dequeue(), Some(3));
        assert_eq!(rx.dequeue(), None);
    }

    #[test]
    fn one_slot_stays_unused() {
        let (mut tx, mut rx) = RingBufferQueue::<u64, 4>::new();
        assert_eq!(tx.capacity(), 3);

        tx.enqueue(1).unwrap();
        tx.enqueue(2).unwrap();
        tx.enqueue(3).unwrap();

        assert!(tx.is_full());
        assert_eq!(tx.enqueue(4), Err(Full(4)));

        assert_eq!(rx.dequeue(), Some(1));
        assert!(!tx.is_full());
        tx.enqueue(4).unwrap();
    }

    #[test]
    fn smallest_ring_holds_one() {
        let (mut tx, mut rx) = RingBufferQueue::<u8, 2>::new();

        tx.enqueue(9).unwrap();
        assert_eq!(tx.enqueue(10), Err(Full(10)));
        assert_eq!(rx.dequeue(), Some(9));
        assert_eq!(rx.dequeue(), None);
    }

    #[test]
    fn len_and_empty_snapshots() {
        let (mut tx, mut rx) = RingBufferQueue::<u64, 8>::new();

        assert!(tx.is_empty());
        assert!(rx.is_empty());
        assert_eq!(rx.len(), 0);

        tx.enqueue(1).unwrap();
        tx.enqueue(2).unwrap();
        assert_eq!(tx.len(), 2);
        assert_eq!(rx.len(), 2);
        assert!(!rx.is_empty());

        rx.dequeue();
        rx.dequeue();
        assert!(rx.is_empty());
    }

    #[test]
    fn wraparound() {
        let (mut tx, mut rx) = RingBufferQueue::<u64, 4>::new();

        for lap in 0..100u64 {
            for i in 0..3 {
                tx.enqueue(lap * 3 + i).unwrap();
            }
            assert_eq!(rx.len(), 3);
            for i in 0..3 {
                assert_eq!(rx.dequeue(), Some(lap * 3 + i));
            }
        }
    }

    #[test]
    fn indices_on_separate_cache_lines() {
        let head = std::mem::offset_of!(RingBufferQueue<u64, 8>, head);
        let tail = std::mem::offset_of!(RingBufferQueue<u64, 8>, tail);
        assert!(tail - head >= 64);
        assert!(std::mem::align_of::<CachePadded<AtomicUsize>>() >= 32);
    }

    #[test]
    fn cross_thread() {
        use std::thread;

        let (mut tx, mut rx) = RingBufferQueue::<u64, 1024>::new();

        let h = thread::spawn(move || {
            for i in 0..100_000u64 {
                while tx.enqueue(i).is_err() {
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0u64;
        while expected < 100_000 {
            if let Some(v) = rx.dequeue() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }

        h.join().unwrap();
    }

    #[test]
    fn drop_remaining() {
        use std::sync::atomic::AtomicUsize;

        let drop_count = Arc::new(AtomicUsize::new(0));

        #[derive(Debug)]
        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (mut tx, mut rx) = RingBufferQueue::<DropCounter, 8>::new();

        tx.enqueue(DropCounter(Arc::clone(&drop_count))).unwrap();
        tx.enqueue(DropCounter(Arc::clone(&drop_count))).unwrap();
        tx.enqueue(DropCounter(Arc::clone(&drop_count))).unwrap();

        drop(rx.dequeue());
        assert_eq!(drop_count.load(Ordering::SeqCst), 1);

        drop(tx);
        drop(rx);

        assert_eq!(drop_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn large_struct() {
        #[derive(Debug, PartialEq)]
        struct LargeMessage {
            data: [u8; 256],
            id: u64,
        }

        let (mut tx, mut rx) = RingBufferQueue::<LargeMessage, 8>::new();

        tx.enqueue(LargeMessage {
            data: [42; 256],
            id: 123,
        })
        .unwrap();

        let msg = rx.dequeue().unwrap();
        assert_eq!(msg.id, 123);
        assert_eq!(msg.data, [42; 256]);
    }
}
