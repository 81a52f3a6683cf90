//! Double-buffered SPSC queue with batch publication.
//!
//! The producer appends into a private write buffer and publishes the whole
//! batch at once by swapping buffer roles. The consumer drains the read
//! buffer element by element. Per-element synchronization is replaced by one
//! role exchange per batch.
//!
//! # Read state
//!
//! Everything the consumer needs is packed into one atomic word, so a swap
//! (new read buffer, new batch length, cursor reset) is a single store:
//!
//! ```text
//!  63     62     61 ........ 31   30 ......... 0
//! ┌──────┬──────┬──────────────┬───────────────┐
//! │ read │ busy │  batch len   │    cursor     │
//! └──────┴──────┴──────────────┴───────────────┘
//! ```
//!
//! The consumer claims an element by setting `busy` with a CAS, moves the
//! element out, then stores the advanced cursor with `busy` cleared. The
//! producer never changes the word while `busy` is set, so a buffer is never
//! recycled under a read in progress. The word fully describes the current
//! batch, so a recycled value (ABA) always names the batch that is live.
//!
//! # Swap discipline
//!
//! A swap clears the buffer that becomes the write buffer. If the consumer
//! has not finished it, the unread elements would be lost:
//!
//! - [`Producer::swap_buffers`] refuses with [`SwapError::Undrained`] until
//!   the previous batch is fully consumed. Nothing is ever lost.
//! - [`Producer::force_swap_buffers`] swaps anyway, drops the unread
//!   remainder and reports how many elements were discarded.
//!
//! # Example
//!
//! ```
//! use relay_queue::double_buffer::DoubleBufferQueue;
//!
//! let (mut tx, mut rx) = DoubleBufferQueue::<u32>::new(16);
//!
//! tx.enqueue(1).unwrap();
//! tx.enqueue(2).unwrap();
//! assert_eq!(rx.dequeue(), None); // not published yet
//!
//! tx.swap_buffers().unwrap();
//! assert_eq!(rx.dequeue(), Some(1));
//! assert_eq!(rx.dequeue(), Some(2));
//! assert_eq!(rx.dequeue(), None);
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::contract::{Dequeue, Enqueue};
use crate::{DEFAULT_CAPACITY, Full};

const FIELD_BITS: u32 = 31;
const FIELD_MASK: u64 = (1 << FIELD_BITS) - 1;
const LEN_SHIFT: u32 = FIELD_BITS;
const BUSY_BIT: u64 = 1 << 62;
const READ_SHIFT: u32 = 63;

/// Largest `max_size` a [`DoubleBufferQueue`] accepts.
pub const MAX_CAPACITY: usize = FIELD_MASK as usize;

/// Decoded form of the packed read state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadState {
    /// Index (0 or 1) of the buffer holding the read role.
    read: usize,
    /// Consumer is moving an element out right now.
    busy: bool,
    /// Number of elements published in the read buffer.
    len: usize,
    /// Number of elements already consumed from it.
    cursor: usize,
}

impl ReadState {
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    const fn decode(word: u64) -> Self {
        Self {
            read: (word >> READ_SHIFT) as usize,
            busy: word & BUSY_BIT != 0,
            len: ((word >> LEN_SHIFT) & FIELD_MASK) as usize,
            cursor: (word & FIELD_MASK) as usize,
        }
    }

    #[inline]
    const fn encode(self) -> u64 {
        ((self.read as u64) << READ_SHIFT)
            | if self.busy { BUSY_BIT } else { 0 }
            | ((self.len as u64 & FIELD_MASK) << LEN_SHIFT)
            | (self.cursor as u64 & FIELD_MASK)
    }

    #[inline]
    const fn remaining(self) -> usize {
        self.len - self.cursor
    }
}

/// Error returned by [`Producer::swap_buffers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapError {
    /// The consumer has not finished the previously published batch.
    Undrained {
        /// Unread elements left in the read buffer.
        remaining: usize,
    },
}

impl fmt::Display for SwapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undrained { remaining } => {
                write!(f, "read buffer still holds {remaining} unread elements")
            }
        }
    }
}

impl std::error::Error for SwapError {}

type Buffer<T> = Box<[UnsafeCell<MaybeUninit<T>>]>;

/// Two fixed buffers with exchangeable write/read roles.
///
/// Created through [`DoubleBufferQueue::new`], which returns the producer and
/// consumer halves. Buffer A starts with the write role, B with the read role.
pub struct DoubleBufferQueue<T> {
    state: CachePadded<AtomicU64>,
    swapped: CachePadded<AtomicBool>,
    buffers: [Buffer<T>; 2],
    max_size: usize,
}

// Safety: the write buffer is only touched by the producer, the read buffer
// only by the consumer while it holds the busy bit, and ownership of a buffer
// changes hands through release/acquire operations on `state`.
unsafe impl<T: Send> Send for DoubleBufferQueue<T> {}
unsafe impl<T: Send> Sync for DoubleBufferQueue<T> {}

impl<T> DoubleBufferQueue<T> {
    /// Creates a queue whose write buffer holds at most `max_size` elements.
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is 0 or larger than [`MAX_CAPACITY`].
    #[allow(clippy::new_ret_no_self)]
    pub fn new(max_size: usize) -> (Producer<T>, Consumer<T>) {
        assert!(max_size > 0, "max_size must be non-zero");
        assert!(
            max_size <= MAX_CAPACITY,
            "max_size must not exceed {MAX_CAPACITY}"
        );

        let allocate = || -> Buffer<T> {
            (0..max_size)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect()
        };

        let initial = ReadState {
            read: 1,
            busy: false,
            len: 0,
            cursor: 0,
        };

        let shared = Arc::new(Self {
            state: CachePadded::new(AtomicU64::new(initial.encode())),
            swapped: CachePadded::new(AtomicBool::new(false)),
            buffers: [allocate(), allocate()],
            max_size,
        });

        tracing::debug!(max_size, "double buffer queue created");

        (
            Producer {
                shared: Arc::clone(&shared),
                write: 0,
                len: 0,
            },
            Consumer { shared },
        )
    }

    /// Creates a queue with [`DEFAULT_CAPACITY`] elements per buffer.
    pub fn with_default_capacity() -> (Producer<T>, Consumer<T>) {
        Self::new(DEFAULT_CAPACITY)
    }

    #[inline]
    fn slot(&self, buffer: usize, index: usize) -> *mut MaybeUninit<T> {
        debug_assert!(buffer < 2 && index < self.max_size);
        // Safety: bounds checked above in debug, guaranteed by callers
        unsafe { self.buffers.get_unchecked(buffer).get_unchecked(index).get() }
    }

    #[inline]
    fn read_state(&self) -> ReadState {
        ReadState::decode(self.state.load(Ordering::Acquire))
    }

    /// Drops the elements `[from, to)` of `buffer` in place.
    ///
    /// # Safety
    ///
    /// The caller must own the buffer and those slots must be initialized.
    unsafe fn drop_range(&self, buffer: usize, from: usize, to: usize) {
        for index in from..to {
            unsafe { (*self.slot(buffer, index)).assume_init_drop() };
        }
    }
}

impl<T> Drop for DoubleBufferQueue<T> {
    fn drop(&mut self) {
        // Unpublished writes are dropped by the producer; only the unread
        // part of the read buffer is left here.
        let state = ReadState::decode(*self.state.get_mut());
        unsafe { self.drop_range(state.read, state.cursor, state.len) };
    }
}

/// Producer half of a [`DoubleBufferQueue`].
pub struct Producer<T> {
    shared: Arc<DoubleBufferQueue<T>>,
    /// Index of the buffer holding the write role.
    write: usize,
    /// Elements written into it since the last swap.
    len: usize,
}

impl<T> Producer<T> {
    /// Appends a value to the write buffer.
    ///
    /// The value is not visible to the consumer until the next swap.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if the write buffer holds `max_size`
    /// elements; swap buffers to make progress.
    #[inline]
    pub fn enqueue(&mut self, value: T) -> Result<(), Full<T>> {
        if self.len >= self.shared.max_size {
            return Err(Full(value));
        }

        // Safety: the write buffer is never read by the consumer
        unsafe { (*self.shared.slot(self.write, self.len)).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Publishes the write buffer as the next batch.
    ///
    /// The former read buffer becomes the (empty) write buffer. An empty
    /// write buffer may be published; the consumer then sees an empty batch.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Undrained`] if the consumer has not consumed the
    /// previous batch yet. Nothing changes in that case.
    pub fn swap_buffers(&mut self) -> Result<(), SwapError> {
        let shared = &*self.shared;

        // Pairs with the consumer's release after its last read
        let retired = shared.read_state();
        let remaining = retired.remaining();
        if remaining > 0 {
            return Err(SwapError::Undrained { remaining });
        }

        // A drained batch is never modified by the consumer, plain store is enough
        shared.state.store(self.next_state().encode(), Ordering::Release);
        self.recycle(retired);
        Ok(())
    }

    /// Publishes the write buffer even if the previous batch is unread.
    ///
    /// Unread elements of the previous batch are dropped. Returns how many
    /// were discarded. Waits only while the consumer is in the middle of
    /// moving one element out.
    pub fn force_swap_buffers(&mut self) -> usize {
        let shared = &*self.shared;
        let next = self.next_state().encode();
        let backoff = Backoff::new();

        let mut current = shared.state.load(Ordering::Acquire);
        let retired = loop {
            let state = ReadState::decode(current);
            if state.busy {
                backoff.snooze();
                current = shared.state.load(Ordering::Acquire);
                continue;
            }

            match shared.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break state,
                Err(actual) => current = actual,
            }
        };

        let discarded = retired.remaining();
        if discarded > 0 {
            // Safety: the consumer can no longer claim from the retired buffer
            unsafe { shared.drop_range(retired.read, retired.cursor, retired.len) };
            tracing::warn!(discarded, "swap discarded unread elements");
        }

        self.recycle(retired);
        discarded
    }

    #[inline]
    const fn next_state(&self) -> ReadState {
        ReadState {
            read: self.write,
            busy: false,
            len: self.len,
            cursor: 0,
        }
    }

    #[inline]
    fn recycle(&mut self, retired: ReadState) {
        tracing::trace!(published = self.len, "buffers swapped");
        self.write = retired.read;
        self.len = 0;
        self.shared.swapped.store(true, Ordering::Release);
    }

    /// Returns `true` if the write buffer holds `max_size` elements.
    #[inline]
    pub fn write_buffer_full(&self) -> bool {
        self.len >= self.shared.max_size
    }

    /// Number of elements written since the last swap.
    #[inline]
    pub const fn write_buffer_size(&self) -> usize {
        self.len
    }

    /// Unread elements left in the published batch (snapshot).
    #[inline]
    pub fn read_buffer_remaining(&self) -> usize {
        self.shared.read_state().remaining()
    }

    /// Returns `true` while the consumer still has unread elements (snapshot).
    #[inline]
    pub fn has_data(&self) -> bool {
        self.read_buffer_remaining() > 0
    }

    /// Returns `max_size`, the bound on the write buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.max_size
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        // Safety: the write buffer is ours and [0, len) is initialized
        unsafe { self.shared.drop_range(self.write, 0, self.len) };
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("write_buffer_size", &self.len)
            .finish_non_exhaustive()
    }
}

/// Consumer half of a [`DoubleBufferQueue`].
pub struct Consumer<T> {
    shared: Arc<DoubleBufferQueue<T>>,
}

impl<T> Consumer<T> {
    /// Removes the next unread element of the published batch.
    ///
    /// Returns `None` once the batch is exhausted, until the producer swaps.
    #[inline]
    pub fn dequeue(&mut self) -> Option<T> {
        let shared = &*self.shared;

        let mut current = shared.state.load(Ordering::Acquire);
        let claimed = loop {
            let state = ReadState::decode(current);
            if state.remaining() == 0 {
                return None;
            }
            debug_assert!(!state.busy, "busy bit set outside of dequeue");

            let busy = ReadState { busy: true, ..state };
            match shared.state.compare_exchange_weak(
                current,
                busy.encode(),
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => break state,
                Err(actual) => current = actual,
            }
        };

        // Safety: the slot is below the published length and the producer
        // will not recycle the buffer while busy is set
        let value = unsafe { (*shared.slot(claimed.read, claimed.cursor)).assume_init_read() };

        let advanced = ReadState {
            cursor: claimed.cursor + 1,
            ..claimed
        };
        shared.state.store(advanced.encode(), Ordering::Release);

        Some(value)
    }

    /// Returns `true` while the published batch has unread elements.
    #[inline]
    pub fn has_data(&self) -> bool {
        self.read_buffer_remaining() > 0
    }

    /// Unread elements left in the published batch.
    #[inline]
    pub fn read_buffer_remaining(&self) -> usize {
        self.shared.read_state().remaining()
    }

    /// Returns `true` once per swap since the last call.
    #[inline]
    pub fn buffer_was_swapped(&self) -> bool {
        self.shared.swapped.swap(false, Ordering::AcqRel)
    }

    /// Returns `max_size`, the bound on the write buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.max_size
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("remaining", &self.read_buffer_remaining())
            .finish_non_exhaustive()
    }
}

impl<T> Enqueue<T> for Producer<T> {
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
        self.write_buffer_size()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.write_buffer_full()
    }
}

impl<T> Dequeue<T> for Consumer<T> {
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
        self.read_buffer_remaining()
    }

    #[inline]
    fn has_data(&self) -> bool {
        Self::has_data(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn read_state_encoding() {
        let state = ReadState {
            read: 1,
            busy: true,
            len: MAX_CAPACITY,
            cursor: 17,
        };
        assert_eq!(ReadState::decode(state.encode()), state);

        let idle = ReadState {
            read: 0,
            busy: false,
            len: 3,
            cursor: 3,
        };
        assert_eq!(idle.encode(), (3 << LEN_SHIFT) | 3);
        assert_eq!(idle.remaining(), 0);
    }

    #[test]
    fn nothing_visible_before_swap() {
        let (mut tx, mut rx) = DoubleBufferQueue::<u32>::new(4);

        tx.enqueue(1).unwrap();
        assert_eq!(tx.write_buffer_size(), 1);
        assert!(!rx.has_data());
        assert_eq!(rx.dequeue(), None);
    }

    #[test]
    fn batch_in_order_after_swap() {
        let (mut tx, mut rx) = DoubleBufferQueue::<&str>::new(8);

        tx.enqueue("a").unwrap();
        tx.enqueue("b").unwrap();
        tx.enqueue("c").unwrap();
        tx.swap_buffers().unwrap();

        assert_eq!(rx.read_buffer_remaining(), 3);
        assert_eq!(rx.dequeue(), Some("a"));
        assert_eq!(rx.dequeue(), Some("b"));
        assert_eq!(rx.dequeue(), Some("c"));
        assert_eq!(rx.dequeue(), None);
        assert!(!rx.has_data());
    }

    #[test]
    fn write_buffer_bound() {
        let (mut tx, _rx) = DoubleBufferQueue::<u32>::new(2);

        tx.enqueue(1).unwrap();
        tx.enqueue(2).unwrap();
        assert!(tx.write_buffer_full());
        assert_eq!(tx.enqueue(3), Err(Full(3)));

        tx.swap_buffers().unwrap();
        assert_eq!(tx.write_buffer_size(), 0);
        assert!(!tx.write_buffer_full());
        tx.enqueue(3).unwrap();
    }

    #[test]
    fn producer_sees_consumer_progress() {
        let (mut tx, mut rx) = DoubleBufferQueue::<u32>::new(2);

        assert!(!tx.has_data());
        assert_eq!(tx.read_buffer_remaining(), 0);
        assert!(Enqueue::is_empty(&tx));

        tx.enqueue(1).unwrap();
        tx.enqueue(2).unwrap();
        assert!(Enqueue::is_full(&tx));
        assert_eq!(Enqueue::len(&tx), 2);
        // Unpublished writes are not readable yet
        assert!(!tx.has_data());

        tx.swap_buffers().unwrap();
        assert!(!Enqueue::is_full(&tx));
        assert!(Enqueue::is_empty(&tx));
        assert!(tx.has_data());
        assert_eq!(tx.read_buffer_remaining(), 2);

        assert_eq!(rx.dequeue(), Some(1));
        assert!(tx.has_data());
        assert_eq!(tx.read_buffer_remaining(), 1);

        assert_eq!(rx.dequeue(), Some(2));
        assert!(!tx.has_data());
        assert_eq!(tx.read_buffer_remaining(), 0);

        // Drained, so the next checked swap goes through
        tx.swap_buffers().unwrap();
    }

    #[test]
    fn swap_refused_until_drained() {
        let (mut tx, mut rx) = DoubleBufferQueue::<u32>::new(8);

        tx.enqueue(1).unwrap();
        tx.enqueue(2).unwrap();
        tx.swap_buffers().unwrap();

        tx.enqueue(3).unwrap();
        assert_eq!(
            tx.swap_buffers(),
            Err(SwapError::Undrained { remaining: 2 })
        );
        // The refused swap left both sides untouched
        assert_eq!(tx.write_buffer_size(), 1);

        assert_eq!(rx.dequeue(), Some(1));
        assert_eq!(
            tx.swap_buffers(),
            Err(SwapError::Undrained { remaining: 1 })
        );
        assert_eq!(rx.dequeue(), Some(2));

        tx.swap_buffers().unwrap();
        assert_eq!(rx.dequeue(), Some(3));
        assert_eq!(rx.dequeue(), None);
    }

    #[test]
    fn forced_swap_discards_unread_remainder() {
        let (mut tx, mut rx) = DoubleBufferQueue::<u32>::new(8);

        tx.enqueue(1).unwrap();
        tx.enqueue(2).unwrap();
        assert_eq!(tx.force_swap_buffers(), 0);

        tx.enqueue(3).unwrap();
        tx.enqueue(4).unwrap();
        assert_eq!(tx.force_swap_buffers(), 2);

        // The first batch is gone
        assert_eq!(rx.dequeue(), Some(3));
        assert_eq!(rx.dequeue(), Some(4));
        assert_eq!(rx.dequeue(), None);
    }

    #[test]
    fn forced_swap_after_partial_drain() {
        let (mut tx, mut rx) = DoubleBufferQueue::<u32>::new(8);

        for i in 0..4 {
            tx.enqueue(i).unwrap();
        }
        tx.swap_buffers().unwrap();
        assert_eq!(rx.dequeue(), Some(0));

        tx.enqueue(10).unwrap();
        assert_eq!(tx.force_swap_buffers(), 3);
        assert_eq!(rx.dequeue(), Some(10));
        assert_eq!(rx.dequeue(), None);
    }

    #[test]
    fn swapped_flag_is_one_shot() {
        let (mut tx, rx) = DoubleBufferQueue::<u32>::new(4);

        assert!(!rx.buffer_was_swapped());
        tx.swap_buffers().unwrap();
        assert!(rx.buffer_was_swapped());
        assert!(!rx.buffer_was_swapped());

        // A refused swap does not raise the flag
        tx.enqueue(1).unwrap();
        tx.swap_buffers().unwrap();
        assert!(rx.buffer_was_swapped());
        tx.enqueue(2).unwrap();
        assert!(tx.swap_buffers().is_err());
        assert!(!rx.buffer_was_swapped());
    }

    #[test]
    fn roles_alternate() {
        let (mut tx, mut rx) = DoubleBufferQueue::<u32>::new(4);

        for round in 0..10 {
            tx.enqueue(round).unwrap();
            tx.enqueue(round + 100).unwrap();
            tx.swap_buffers().unwrap();
            assert_eq!(rx.dequeue(), Some(round));
            assert_eq!(rx.dequeue(), Some(round + 100));
            assert_eq!(rx.dequeue(), None);
        }
    }

    #[test]
    fn empty_swap_is_harmless() {
        let (mut tx, mut rx) = DoubleBufferQueue::<u32>::new(4);

        tx.swap_buffers().unwrap();
        tx.swap_buffers().unwrap();
        assert_eq!(rx.dequeue(), None);

        tx.enqueue(5).unwrap();
        tx.swap_buffers().unwrap();
        assert_eq!(rx.dequeue(), Some(5));
    }

    #[test]
    #[should_panic(expected = "max_size must be non-zero")]
    fn zero_capacity_panics() {
        let _ = DoubleBufferQueue::<u32>::new(0);
    }

    #[test]
    fn default_capacity() {
        let (tx, rx) = DoubleBufferQueue::<u8>::with_default_capacity();
        assert_eq!(tx.capacity(), DEFAULT_CAPACITY);
        assert_eq!(rx.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn drops_everything_exactly_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let item = || DropCounter(Arc::clone(&drops));

        let (mut tx, mut rx) = DoubleBufferQueue::<DropCounter>::new(8);

        // Batch 1: three published, one consumed
        tx.enqueue(item()).unwrap();
        tx.enqueue(item()).unwrap();
        tx.enqueue(item()).unwrap();
        tx.swap_buffers().unwrap();
        drop(rx.dequeue());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        // Batch 2 forced over the two unread ones
        tx.enqueue(item()).unwrap();
        assert_eq!(tx.force_swap_buffers(), 2);
        assert_eq!(drops.load(Ordering::SeqCst), 3);

        // One unpublished write left behind
        tx.enqueue(item()).unwrap();

        drop(tx);
        assert_eq!(drops.load(Ordering::SeqCst), 4);
        drop(rx);
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn cross_thread_batches() {
        use std::thread;

        const COUNT: u64 = 100_000;

        let (mut tx, mut rx) = DoubleBufferQueue::<u64>::new(256);

        let producer = thread::spawn(move || {
            let backoff = Backoff::new();
            for i in 0..COUNT {
                let mut value = i;
                loop {
                    match tx.enqueue(value) {
                        Ok(()) => break,
                        Err(Full(v)) => {
                            value = v;
                            if tx.swap_buffers().is_err() {
                                backoff.snooze();
                            }
                        }
                    }
                }
                if i % 64 == 63 {
                    let _ = tx.swap_buffers();
                }
            }
            while tx.swap_buffers().is_err() {
                backoff.snooze();
            }
        });

        let mut expected = 0u64;
        while expected < COUNT {
            if let Some(v) = rx.dequeue() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }

        producer.join().unwrap();
        assert_eq!(rx.dequeue(), None);
    }

    #[test]
    fn forced_swaps_under_concurrency_lose_but_never_duplicate() {
        use std::thread;

        const COUNT: u64 = 50_000;

        let (mut tx, mut rx) = DoubleBufferQueue::<u64>::new(64);
        let discarded = Arc::new(AtomicUsize::new(0));
        let producer_discarded = Arc::clone(&discarded);
        let done = Arc::new(AtomicBool::new(false));
        let producer_done = Arc::clone(&done);

        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                let mut value = i;
                while let Err(Full(v)) = tx.enqueue(value) {
                    value = v;
                    producer_discarded.fetch_add(tx.force_swap_buffers(), Ordering::SeqCst);
                }
            }
            producer_discarded.fetch_add(tx.force_swap_buffers(), Ordering::SeqCst);
            producer_done.store(true, Ordering::Release);
        });

        let mut received = Vec::new();
        while !done.load(Ordering::Acquire) || rx.has_data() {
            if let Some(v) = rx.dequeue() {
                received.push(v);
            }
        }
        producer.join().unwrap();

        // Strictly increasing: no duplicates, no reordering
        assert!(received.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            received.len() + discarded.load(Ordering::SeqCst),
            COUNT as usize
        );
    }
}
