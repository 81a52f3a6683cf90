//! Producer/consumer runs over each queue design.
//!
//! Every run uses two threads. The producer first pushes `warmup` records
//! that the consumer drains untimed, then starts the clock and pushes
//! `operations` records, measuring each enqueue including retries. The
//! consumer polls until the producer is done and the queue has no data left.
//! The run ends when both threads have joined.

use std::fmt;
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use hdrhistogram::CreationError;
use relay_queue::double_buffer::Producer as BatchProducer;
use relay_queue::{Dequeue, DoubleBufferQueue, Enqueue, Full, LockingBoundedQueue, RingBufferQueue};

use crate::config::BenchConfig;
use crate::stats::{BenchResult, Collector};

/// Slots of the benchmarked ring; the const generic cannot follow the
/// runtime queue size.
pub const RING_SLOTS: usize = 2048;

/// One cache line of payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct Record {
    /// Sequence number within the run.
    pub id: u64,
    /// Nanoseconds since the run started, taken at creation.
    pub timestamp: u64,
    _padding: [u8; 48],
}

const _: () = assert!(std::mem::size_of::<Record>() == 64);

impl Record {
    /// Creates a record with zeroed padding.
    pub const fn new(id: u64, timestamp: u64) -> Self {
        Self {
            id,
            timestamp,
            _padding: [0; 48],
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// The queue designs under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Design {
    /// [`RingBufferQueue`] with [`RING_SLOTS`] slots.
    Ring,
    /// [`LockingBoundedQueue`].
    Locked,
    /// [`DoubleBufferQueue`].
    DoubleBuffer,
}

impl Design {
    /// Every design, in report order.
    pub const ALL: [Self; 3] = [Self::Ring, Self::Locked, Self::DoubleBuffer];

    /// Display name used in logs and the report.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ring => "SPSC Lock-Free Queue",
            Self::Locked => "Locked Queue",
            Self::DoubleBuffer => "Double Buffer SPSC",
        }
    }
}

impl fmt::Display for Design {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure to run a benchmark.
#[derive(Debug)]
pub enum BenchError {
    /// The latency histogram could not be created.
    Histogram(CreationError),
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Histogram(e) => write!(f, "latency histogram: {e}"),
        }
    }
}

impl std::error::Error for BenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Histogram(e) => Some(e),
        }
    }
}

impl From<CreationError> for BenchError {
    fn from(e: CreationError) -> Self {
        Self::Histogram(e)
    }
}

/// Raw outcome of a single run.
#[derive(Debug)]
pub struct RunSample {
    /// Timed phase, from the first timed enqueue until both threads joined.
    pub elapsed: Duration,
    /// Latency of every timed enqueue, in nanoseconds.
    pub latencies_ns: Vec<u64>,
    /// Records the consumer saw after warmup.
    pub consumed: usize,
}

/// Runs `design` `config.runs` times and aggregates the results.
///
/// # Errors
///
/// Returns [`BenchError`] if the statistics cannot be set up.
pub fn run_design(design: Design, config: &BenchConfig) -> Result<BenchResult, BenchError> {
    let mut collector = Collector::new(design)?;

    for run in 0..config.runs {
        let sample = run_once(design, config);

        if sample.consumed != config.operations {
            tracing::error!(
                design = design.name(),
                run,
                produced = config.operations,
                consumed = sample.consumed,
                "consumer count does not match producer count"
            );
        }

        tracing::debug!(
            design = design.name(),
            run,
            elapsed_ms = sample.elapsed.as_secs_f64() * 1e3,
            "run finished"
        );

        collector.record_run(config.operations, sample.elapsed, &sample.latencies_ns);
    }

    Ok(collector.finish())
}

/// Runs `design` once.
pub fn run_once(design: Design, config: &BenchConfig) -> RunSample {
    match design {
        Design::Ring => {
            let (tx, rx) = RingBufferQueue::<Record, RING_SLOTS>::new();
            drive(Snooze::new(tx), rx, config)
        }
        Design::Locked => {
            let queue = LockingBoundedQueue::new(config.queue_size);
            drive(Snooze::new(&queue), &queue, config)
        }
        Design::DoubleBuffer => {
            let (tx, rx) = DoubleBufferQueue::new(config.queue_size);
            drive(Batched::new(tx, config.swap_interval()), rx, config)
        }
    }
}

/// Producer-side retry and publication policy.
trait Feed {
    /// Pushes one record, retrying until it is accepted.
    fn push(&mut self, record: Record);

    /// Called after the `index`-th push of a phase.
    fn tick(&mut self, _index: usize) {}

    /// Makes everything pushed so far visible to the consumer.
    fn flush(&mut self) {}
}

/// Retries a full queue with [`Backoff::snooze`].
struct Snooze<P> {
    tx: P,
    backoff: Backoff,
}

impl<P> Snooze<P> {
    fn new(tx: P) -> Self {
        Self {
            tx,
            backoff: Backoff::new(),
        }
    }
}

impl<P: Enqueue<Record>> Feed for Snooze<P> {
    #[inline]
    fn push(&mut self, mut record: Record) {
        self.backoff.reset();
        while let Err(Full(back)) = self.tx.enqueue(record) {
            record = back;
            self.backoff.snooze();
        }
    }
}

/// Publishes double-buffer batches periodically and whenever the write
/// buffer fills up. Only checked swaps are used, so nothing is discarded.
struct Batched {
    tx: BatchProducer<Record>,
    interval: usize,
    backoff: Backoff,
}

impl Batched {
    fn new(tx: BatchProducer<Record>, interval: usize) -> Self {
        Self {
            tx,
            interval,
            backoff: Backoff::new(),
        }
    }
}

impl Feed for Batched {
    #[inline]
    fn push(&mut self, mut record: Record) {
        self.backoff.reset();
        while let Err(Full(back)) = self.tx.enqueue(record) {
            record = back;
            if self.tx.swap_buffers().is_err() {
                self.backoff.snooze();
            }
        }
    }

    #[inline]
    fn tick(&mut self, index: usize) {
        if index % self.interval == 0 {
            // Undrained is fine here; the batch just keeps growing
            let _ = self.tx.swap_buffers();
        }
    }

    fn flush(&mut self) {
        self.backoff.reset();
        while self.tx.swap_buffers().is_err() {
            self.backoff.snooze();
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
#[inline]
fn nanos_since(origin: Instant) -> u64 {
    origin.elapsed().as_nanos() as u64
}

fn drive<F, C>(mut feed: F, mut rx: C, config: &BenchConfig) -> RunSample
where
    F: Feed + Send,
    C: Dequeue<Record> + Send,
{
    let done = AtomicBool::new(false);
    let origin = Instant::now();

    let (started, latencies_ns, consumed) = thread::scope(|s| {
        let done = &done;

        let consumer = s.spawn(move || consume(&mut rx, config.warmup, done));
        let producer = s.spawn(move || produce(&mut feed, config, origin, done));

        let (started, latencies) = producer
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        let consumed = consumer
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (started, latencies, consumed)
    });

    RunSample {
        elapsed: started.elapsed(),
        latencies_ns,
        consumed,
    }
}

fn produce<F: Feed>(
    feed: &mut F,
    config: &BenchConfig,
    origin: Instant,
    done: &AtomicBool,
) -> (Instant, Vec<u64>) {
    for i in 0..config.warmup {
        feed.push(Record::new(i as u64, nanos_since(origin)));
        feed.tick(i);
    }
    feed.flush();

    let mut latencies = Vec::with_capacity(config.operations);
    let started = Instant::now();

    for i in 0..config.operations {
        let start = Instant::now();
        feed.push(Record::new(i as u64, nanos_since(origin)));
        latencies.push(nanos_since(start));
        feed.tick(i);
    }
    feed.flush();

    done.store(true, Ordering::Release);
    (started, latencies)
}

fn consume<C: Dequeue<Record>>(rx: &mut C, warmup: usize, done: &AtomicBool) -> usize {
    let backoff = Backoff::new();

    let mut warmed = 0;
    while warmed < warmup {
        if rx.dequeue().is_some() {
            warmed += 1;
            backoff.reset();
        } else {
            backoff.snooze();
        }
    }

    let mut consumed = 0;
    while !done.load(Ordering::Acquire) || rx.has_data() {
        if let Some(record) = rx.dequeue() {
            black_box(record);
            consumed += 1;
        } else {
            std::hint::spin_loop();
        }
    }
    consumed
}
