//! Wringer CLI - scenario-matrix verification runner
//!
//! # Commands
//!
//! - `list` - List matrix case names
//! - `run` - Run cases against the simulated device

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use wringer_device::{SimConfig, SimDevice};
use wringer_harness::matrix::{build_cases, run_matrix, Outcome};
use wringer_harness::Geometry;
use wringer_trace::TraceConfig;

/// Wringer - scenario-matrix verification for compute accelerators
#[derive(Parser)]
#[command(name = "wringer")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List matrix case names
    ///
    /// Examples:
    ///   wringer list tiny-prw
    ///   wringer list --all hang
    List {
        /// Only list cases whose name contains this substring
        #[arg(value_name = "PATTERN")]
        pattern: Option<String>,

        /// Include the exhaustive cases (host engines, hang variants)
        #[arg(short, long)]
        all: bool,
    },
    /// Run cases against the simulated device
    ///
    /// Examples:
    ///   wringer run tiny-prw-blt
    ///   wringer run --all --format json basic0
    Run {
        /// Only run cases whose name contains this substring
        #[arg(value_name = "PATTERN")]
        pattern: Option<String>,

        /// Run the exhaustive matrix (host engines, hang variants)
        #[arg(short, long)]
        all: bool,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Buffer width in pixels
        #[arg(long, default_value_t = 512)]
        width: usize,

        /// Buffer height in pixels
        #[arg(long, default_value_t = 512)]
        height: usize,

        /// Simulate a device without a shared last-level cache
        #[arg(long)]
        no_llc: bool,

        /// Simulate a device whose command parser rewrites addresses
        #[arg(long)]
        command_parser: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> ExitCode {
    if let Err(err) = wringer_trace::init_global_tracing(&TraceConfig::from_env()) {
        eprintln!("wringer: {err}");
        return ExitCode::FAILURE;
    }

    match Cli::parse().command {
        Commands::List { pattern, all } => list_cases(pattern.as_deref(), all),
        Commands::Run {
            pattern,
            all,
            format,
            width,
            height,
            no_llc,
            command_parser,
        } => run_cases(
            pattern.as_deref(),
            all,
            format,
            Geometry { width, height },
            no_llc,
            command_parser,
        ),
    }
}

fn matches(name: &str, pattern: Option<&str>) -> bool {
    pattern.map_or(true, |p| name.contains(p))
}

fn list_cases(pattern: Option<&str>, all: bool) -> ExitCode {
    for case in build_cases(all) {
        if matches(&case.name, pattern) {
            println!("{}", case.name);
        }
    }
    ExitCode::SUCCESS
}

fn run_cases(
    pattern: Option<&str>,
    all: bool,
    format: Format,
    geometry: Geometry,
    no_llc: bool,
    command_parser: bool,
) -> ExitCode {
    let mut config = if command_parser {
        SimConfig::with_command_parser()
    } else {
        SimConfig::default()
    };
    if no_llc {
        config.caps.llc = false;
    }
    let device = SimDevice::new(config);

    let cases = build_cases(all);
    let report = run_matrix(&device, &cases, geometry, |name| matches(name, pattern));

    match format {
        Format::Text => {
            for result in &report.results {
                match &result.outcome {
                    Outcome::Pass => println!("PASS  {}", result.name),
                    Outcome::Skip { reason } => println!("SKIP  {} ({reason})", result.name),
                    Outcome::Fail { error } => println!("FAIL  {} ({error})", result.name),
                }
            }
            println!(
                "{} passed, {} skipped, {} failed",
                report.passed(),
                report.skipped(),
                report.failed()
            );
        }
        Format::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("wringer: failed to encode report: {err}");
                return ExitCode::FAILURE;
            }
        },
    }

    if report.any_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches("tiny-prw-blt-basic0", None));
        assert!(matches("tiny-prw-blt-basic0", Some("prw-blt")));
        assert!(!matches("tiny-prw-blt-basic0", Some("render")));
    }
}
