//! End-to-end matrix runs against the simulated device

use wringer_device::{SimConfig, SimDevice};
use wringer_harness::matrix::{build_cases, run_case, run_matrix, Outcome};
use wringer_harness::Geometry;

fn small() -> Geometry {
    Geometry {
        width: 64,
        height: 64,
    }
}

/// A slice of the reduced matrix runs clean: every case passes or
/// skips, nothing fails
#[test]
fn test_reduced_tiny_slice_runs_clean() {
    let device = SimDevice::default();
    let cases = build_cases(false);

    let report = run_matrix(&device, &cases, small(), |name| {
        name.starts_with("tiny-prw-") && !name.contains("-forked") && !name.contains("-bomb")
    });

    assert!(report.results.len() > 0);
    assert_eq!(report.failed(), 0, "{:?}", report.results);
    assert!(report.passed() > 0);
}

#[test]
fn test_diagnostic_cases_pass() {
    let device = SimDevice::default();
    let cases = build_cases(false);

    let report = run_matrix(&device, &cases, small(), |name| name.starts_with("error-state-"));
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.failed(), 0, "{:?}", report.results);
    assert_eq!(report.passed(), 3);
}

/// Unsupported combinations surface as skips with a reason, never as
/// failures
#[test]
fn test_unsupported_combinations_skip() {
    let device = SimDevice::default();
    let cases = build_cases(false);

    // snooped caching is pointless on an LLC device
    let report = run_matrix(&device, &cases, small(), |name| name == "tiny-snoop-blt-basic0");
    assert!(matches!(&report.results[0].outcome, Outcome::Skip { reason } if reason.contains("last-level cache")));

    // private and stolen memory are not supported by default
    for name in ["private-tiny-prw-blt-basic0", "stolen-tiny-prw-blt-basic0"] {
        let report = run_matrix(&device, &cases, small(), |n| n == name);
        assert!(
            matches!(&report.results[0].outcome, Outcome::Skip { .. }),
            "{name}: {:?}",
            report.results[0].outcome
        );
    }

    // no swap on the simulated host
    let report = run_matrix(&device, &cases, small(), |name| name == "swap-prw-blt-basic0");
    assert!(matches!(&report.results[0].outcome, Outcome::Skip { reason } if reason.contains("swap")));
}

/// The snooped strategy becomes runnable once the device has no
/// shared cache
#[test]
fn test_snoop_runs_without_llc() {
    let device = SimDevice::new(SimConfig::without_llc());
    let cases = build_cases(false);

    let report = run_matrix(&device, &cases, small(), |name| name == "tiny-snoop-blt-basic0");
    assert_eq!(report.results[0].outcome, Outcome::Pass);
}

/// A failing device shows up as a failure, not a panic: drop every
/// completion notification and run one case
#[test]
fn test_lossy_device_fails_cases() {
    let device = SimDevice::new(SimConfig::dropping_notifications());
    let cases = build_cases(false);

    let report = run_matrix(&device, &cases, small(), |name| name == "tiny-prw-blt-basic0");
    assert!(
        matches!(&report.results[0].outcome, Outcome::Fail { error } if error.contains("notification")),
        "{:?}",
        report.results[0].outcome
    );
    assert!(report.any_failed());
}

#[test]
fn test_report_serializes_to_json() {
    let device = SimDevice::default();
    let cases = build_cases(false);

    let report = run_matrix(&device, &cases, small(), |name| name == "error-state-basic");
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"error-state-basic\""));
    assert!(json.contains("\"outcome\":\"pass\""));
}
