//! Throughput and latency comparison of the `relay-queue` designs.
//!
//! [`harness::run_design`] drives one producer and one consumer thread over a
//! queue, [`stats`] turns the samples into averages and percentiles, and
//! [`report`] renders the comparison table.
//!
//! For stable numbers, pin the process to two physical cores:
//!
//! ```text
//! taskset -c 0,2 cargo run --release -p relay-bench
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod harness;
pub mod report;
pub mod stats;

pub use config::{BenchConfig, ConfigError};
pub use harness::{BenchError, Design, Record, run_design};
pub use stats::BenchResult;

/// Installs the `fmt` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
