//! Run parameters, read from the environment.

use std::fmt;
use std::time::Duration;

use relay_queue::double_buffer::MAX_CAPACITY;

/// Timed operations per run.
pub const OPERATIONS_VAR: &str = "RELAY_BENCH_OPERATIONS";
/// Capacity of the runtime-sized queues.
pub const QUEUE_SIZE_VAR: &str = "RELAY_BENCH_QUEUE_SIZE";
/// Untimed operations before each run.
pub const WARMUP_VAR: &str = "RELAY_BENCH_WARMUP";
/// Runs per queue design.
pub const RUNS_VAR: &str = "RELAY_BENCH_RUNS";
/// Producer pause between demo messages, in milliseconds.
pub const DEMO_INTERVAL_VAR: &str = "RELAY_DEMO_INTERVAL_MS";

const DEFAULT_DEMO_INTERVAL_MS: usize = 100;

/// Parameters of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchConfig {
    /// Timed enqueues per run.
    pub operations: usize,
    /// `max_size` of the locking and double-buffer queues.
    pub queue_size: usize,
    /// Enqueues before the timer starts.
    pub warmup: usize,
    /// Runs per design; throughput is averaged across them.
    pub runs: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            operations: 1_000_000,
            queue_size: 1024,
            warmup: 10_000,
            runs: 3,
        }
    }
}

impl BenchConfig {
    /// Reads overrides from the process environment.
    ///
    /// # Errors
    ///
    /// See [`from_lookup`](Self::from_lookup).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to the defaults for
    /// absent keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value is not a positive integer or the
    /// queue size exceeds what the double buffer can index.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let queue_size = positive(QUEUE_SIZE_VAR, lookup(QUEUE_SIZE_VAR), defaults.queue_size)?;
        if queue_size > MAX_CAPACITY {
            return Err(ConfigError::TooLarge {
                key: QUEUE_SIZE_VAR,
                value: queue_size,
                max: MAX_CAPACITY,
            });
        }

        Ok(Self {
            operations: positive(OPERATIONS_VAR, lookup(OPERATIONS_VAR), defaults.operations)?,
            queue_size,
            // Warmup may legitimately be skipped
            warmup: parse(WARMUP_VAR, lookup(WARMUP_VAR), defaults.warmup)?,
            runs: positive(RUNS_VAR, lookup(RUNS_VAR), defaults.runs)?,
        })
    }

    /// Operations between periodic double-buffer swaps.
    pub fn swap_interval(&self) -> usize {
        (self.queue_size / 4).max(1)
    }
}

/// Reads the demo producer pause from the environment.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the value is not an integer.
pub fn demo_interval_from_env() -> Result<Duration, ConfigError> {
    demo_interval_from_lookup(|key| std::env::var(key).ok())
}

/// Lookup-driven form of [`demo_interval_from_env`].
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the value is not an integer.
pub fn demo_interval_from_lookup<F>(lookup: F) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let millis = parse(
        DEMO_INTERVAL_VAR,
        lookup(DEMO_INTERVAL_VAR),
        DEFAULT_DEMO_INTERVAL_MS,
    )?;
    Ok(Duration::from_millis(millis as u64))
}

fn parse(key: &'static str, raw: Option<String>, default: usize) -> Result<usize, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn positive(key: &'static str, raw: Option<String>, default: usize) -> Result<usize, ConfigError> {
    match parse(key, raw, default)? {
        0 => Err(ConfigError::Zero { key }),
        n => Ok(n),
    }
}

/// Rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Not an unsigned integer.
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Raw value as found.
        value: String,
    },
    /// Zero where at least one is required.
    Zero {
        /// Environment variable name.
        key: &'static str,
    },
    /// Above the supported maximum.
    TooLarge {
        /// Environment variable name.
        key: &'static str,
        /// Parsed value.
        value: usize,
        /// Largest accepted value.
        max: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { key, value } => {
                write!(f, "{key}: expected an unsigned integer, got {value:?}")
            }
            Self::Zero { key } => write!(f, "{key}: must be at least 1"),
            Self::TooLarge { key, value, max } => {
                write!(f, "{key}: {value} exceeds the maximum of {max}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
