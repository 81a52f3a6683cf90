//! Result table and relative comparison.

use std::fmt::{self, Write};

use crate::config::BenchConfig;
use crate::harness::Design;
use crate::stats::BenchResult;

const WIDTH: usize = 100;

/// Relative difference of a candidate against a baseline, in percent.
///
/// Positive numbers favour the candidate: higher throughput, lower latency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    /// Throughput gain over the baseline.
    pub throughput_pct: f64,
    /// Mean latency reduction relative to the baseline.
    pub latency_pct: f64,
}

impl Comparison {
    /// Compares `candidate` with `baseline`. `None` if the baseline has a
    /// zero throughput or latency to divide by.
    pub fn between(candidate: &BenchResult, baseline: &BenchResult) -> Option<Self> {
        if baseline.throughput_ops_per_sec <= 0.0 || baseline.mean_latency_ns <= 0.0 {
            return None;
        }

        Some(Self {
            throughput_pct: (candidate.throughput_ops_per_sec - baseline.throughput_ops_per_sec)
                / baseline.throughput_ops_per_sec
                * 100.0,
            latency_pct: (baseline.mean_latency_ns - candidate.mean_latency_ns)
                / baseline.mean_latency_ns
                * 100.0,
        })
    }
}

/// Renders the run parameters block.
pub fn render_config(config: &BenchConfig) -> String {
    format!(
        "Configuration:\n  operations: {}\n  queue size: {}\n  warmup:     {}\n  runs:       {}\n",
        config.operations, config.queue_size, config.warmup, config.runs
    )
}

/// Writes the result table followed by the comparisons that apply.
///
/// # Errors
///
/// Propagates any error from `out`.
pub fn render<W: Write>(out: &mut W, results: &[BenchResult]) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(WIDTH))?;
    writeln!(out, "Queue comparison results")?;
    writeln!(out, "{}", "=".repeat(WIDTH))?;
    writeln!(
        out,
        "{:<22}{:>16}{:>12}{:>12}{:>14}{:>12}{:>12}",
        "Queue", "Throughput/s", "Mean ns", "Min ns", "Max ns", "P95 ns", "P99 ns"
    )?;
    writeln!(out, "{}", "-".repeat(WIDTH))?;

    for r in results {
        writeln!(
            out,
            "{:<22}{:>16.0}{:>12.1}{:>12}{:>14}{:>12}{:>12}",
            r.design.name(),
            r.throughput_ops_per_sec,
            r.mean_latency_ns,
            r.min_latency_ns,
            r.max_latency_ns,
            r.p95_latency_ns,
            r.p99_latency_ns
        )?;
    }
    writeln!(out, "{}", "=".repeat(WIDTH))?;

    let find = |design: Design| results.iter().find(|r| r.design == design);
    let ring = find(Design::Ring);
    let locked = find(Design::Locked);
    let double = find(Design::DoubleBuffer);

    if ring.is_some() && (locked.is_some() || double.is_some()) {
        writeln!(out)?;
        writeln!(out, "Comparison:")?;
        writeln!(out, "{}", "-".repeat(WIDTH / 2))?;
    }

    if let (Some(ring), Some(locked)) = (ring, locked) {
        write_comparison(out, "Lock-free vs locked", Comparison::between(ring, locked))?;
    }
    if let (Some(ring), Some(double)) = (ring, double) {
        write_comparison(out, "Double buffer vs lock-free", Comparison::between(double, ring))?;
    }

    Ok(())
}

fn write_comparison<W: Write>(out: &mut W, title: &str, cmp: Option<Comparison>) -> fmt::Result {
    writeln!(out, "{title}:")?;
    match cmp {
        Some(cmp) => {
            writeln!(out, "  throughput: {:+.1}%", cmp.throughput_pct)?;
            writeln!(out, "  latency:    {:+.1}% lower", cmp.latency_pct)
        }
        None => writeln!(out, "  n/a (empty baseline)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(design: Design, throughput: f64, mean: f64) -> BenchResult {
        BenchResult {
            design,
            throughput_ops_per_sec: throughput,
            mean_latency_ns: mean,
            min_latency_ns: 10,
            max_latency_ns: 5_000,
            p95_latency_ns: 200,
            p99_latency_ns: 900,
            samples: 1_000,
        }
    }

    fn rendered(results: &[BenchResult]) -> String {
        let mut out = String::new();
        render(&mut out, results).unwrap();
        out
    }

    /// Refuses every write.
    struct Closed;

    impl Write for Closed {
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    #[test]
    fn write_errors_reach_the_caller() {
        let results = [result(Design::Ring, 1.0, 1.0)];
        assert_eq!(render(&mut Closed, &results), Err(fmt::Error));
    }

    #[test]
    fn comparison_percentages() {
        let fast = result(Design::Ring, 3_000_000.0, 50.0);
        let slow = result(Design::Locked, 2_000_000.0, 100.0);

        let cmp = Comparison::between(&fast, &slow).unwrap();
        assert!((cmp.throughput_pct - 50.0).abs() < 1e-9);
        assert!((cmp.latency_pct - 50.0).abs() < 1e-9);

        let cmp = Comparison::between(&slow, &fast).unwrap();
        assert!((cmp.throughput_pct + 33.333).abs() < 1e-2);
        assert!((cmp.latency_pct + 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_baseline_has_no_comparison() {
        let a = result(Design::Ring, 1.0, 1.0);
        let zero = result(Design::Locked, 0.0, 0.0);
        assert_eq!(Comparison::between(&a, &zero), None);
    }

    #[test]
    fn table_lists_every_design_and_both_comparisons() {
        let results = [
            result(Design::Ring, 3_000_000.0, 50.0),
            result(Design::Locked, 2_000_000.0, 100.0),
            result(Design::DoubleBuffer, 6_000_000.0, 25.0),
        ];
        let text = rendered(&results);

        for design in Design::ALL {
            assert!(text.contains(design.name()), "missing {design}");
        }
        assert!(text.contains("Lock-free vs locked:"));
        assert!(text.contains("Double buffer vs lock-free:"));
        assert!(text.contains("+50.0%"));
        assert!(text.contains("+100.0%"));
    }

    #[test]
    fn single_result_has_no_comparison() {
        let text = rendered(&[result(Design::Locked, 1.0, 1.0)]);
        assert!(text.contains("Locked Queue"));
        assert!(!text.contains("Comparison"));
    }

    #[test]
    fn config_block() {
        let text = render_config(&BenchConfig::default());
        assert!(text.contains("operations: 1000000"));
        assert!(text.contains("runs:       3"));
    }
}
