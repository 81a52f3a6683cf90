//! Throughput and latency aggregation.

use std::fmt;
use std::time::Duration;

use hdrhistogram::{CreationError, Histogram};

use crate::harness::Design;

/// Latencies above this are clamped (10 s).
pub const MAX_TRACKED_NS: u64 = 10_000_000_000;

/// Aggregated outcome of every run of one design.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchResult {
    /// Design that produced these numbers.
    pub design: Design,
    /// Mean of the per-run throughputs, in operations per second.
    pub throughput_ops_per_sec: f64,
    /// Mean enqueue latency across all runs.
    pub mean_latency_ns: f64,
    /// Fastest enqueue.
    pub min_latency_ns: u64,
    /// Slowest enqueue (clamped to [`MAX_TRACKED_NS`]).
    pub max_latency_ns: u64,
    /// 95th percentile enqueue latency.
    pub p95_latency_ns: u64,
    /// 99th percentile enqueue latency.
    pub p99_latency_ns: u64,
    /// Latency samples behind the percentiles.
    pub samples: u64,
}

/// Accumulates runs of one design.
pub struct Collector {
    design: Design,
    histogram: Histogram<u64>,
    throughputs: Vec<f64>,
}

impl Collector {
    /// Creates an empty collector.
    ///
    /// # Errors
    ///
    /// Fails only if hdrhistogram rejects the tracking range.
    pub fn new(design: Design) -> Result<Self, CreationError> {
        Ok(Self {
            design,
            histogram: Histogram::new_with_max(MAX_TRACKED_NS, 3)?,
            throughputs: Vec::new(),
        })
    }

    /// Adds one run: its timed-phase duration and per-enqueue latencies.
    pub fn record_run(&mut self, operations: usize, elapsed: Duration, latencies_ns: &[u64]) {
        self.throughputs.push(throughput(operations, elapsed));
        for &ns in latencies_ns {
            self.histogram.saturating_record(ns);
        }
    }

    /// Number of runs recorded so far.
    pub fn runs(&self) -> usize {
        self.throughputs.len()
    }

    /// Computes the summary.
    pub fn finish(self) -> BenchResult {
        let hist = &self.histogram;
        let empty = hist.is_empty();

        BenchResult {
            design: self.design,
            throughput_ops_per_sec: mean(&self.throughputs),
            mean_latency_ns: if empty { 0.0 } else { hist.mean() },
            min_latency_ns: if empty { 0 } else { hist.min() },
            max_latency_ns: hist.max(),
            p95_latency_ns: hist.value_at_quantile(0.95),
            p99_latency_ns: hist.value_at_quantile(0.99),
            samples: hist.len(),
        }
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("design", &self.design)
            .field("runs", &self.runs())
            .field("samples", &self.histogram.len())
            .finish_non_exhaustive()
    }
}

/// Operations per second; zero when no time elapsed.
#[allow(clippy::cast_precision_loss)]
pub fn throughput(operations: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        operations as f64 / secs
    } else {
        0.0
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
