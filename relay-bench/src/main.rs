//! Runs every queue design and prints the comparison.
//!
//! Configured through `RELAY_BENCH_OPERATIONS`, `RELAY_BENCH_QUEUE_SIZE`,
//! `RELAY_BENCH_WARMUP` and `RELAY_BENCH_RUNS`.

use std::process::ExitCode;

use relay_bench::{BenchConfig, Design, report, run_design};

fn main() -> ExitCode {
    relay_bench::init_tracing();

    let config = match BenchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    println!("{}", report::render_config(&config));

    let mut results = Vec::with_capacity(Design::ALL.len());
    for design in Design::ALL {
        tracing::info!(design = design.name(), runs = config.runs, "benchmarking");

        match run_design(design, &config) {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!(design = design.name(), error = %e, "benchmark failed");
                return ExitCode::FAILURE;
            }
        }
    }

    let mut table = String::new();
    if let Err(e) = report::render(&mut table, &results) {
        tracing::error!(error = %e, "failed to render report");
        return ExitCode::FAILURE;
    }

    print!("{table}");
    ExitCode::SUCCESS
}
