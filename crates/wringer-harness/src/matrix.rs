//! The verification matrix
//!
//! Cases are the cross product of creation kind, working-set size,
//! access strategy, copy engine, scenario, wrapper and hang variant,
//! named
//!
//! ```text
//! {create}{size}-{strategy}-{engine}-{scenario}{wrapper}{hang}
//! ```
//!
//! e.g. `tiny-prw-blt-basic0` or `private-full-gpu-render-early-read-forked`.
//!
//! The reduced matrix sticks to the queue engines with no hangs; the
//! exhaustive matrix adds the host-mediated engines and, for the
//! plain wrapper, the hang variants. Combinations the device cannot
//! express are reported as skips, never failures.

use serde::Serialize;
use wringer_device::{Device, DeviceError, MemKind, Queue};

use crate::access::{AccessStrategy, STRATEGIES};
use crate::buffers::{Geometry, MIN_BUFFERS};
use crate::context::Harness;
use crate::copy::{CopyEngine, ENGINES};
use crate::error::CaseError;
use crate::hang::{self, HangKind};
use crate::scenario::{Scenario, SCENARIOS};
use crate::wrapper::Wrapper;

/// Working-set sizes, scaled from the device's capability report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// The minimum set that still exercises concurrency
    Tiny,
    /// A quarter of the mappable aperture
    Small,
    /// Enough to overflow the mappable aperture
    Thrash,
    /// Enough to overflow the total aperture
    Full,
    /// Enough to push the working set into swap
    Swap,
}

impl SizeClass {
    pub const ALL: [SizeClass; 5] = [
        SizeClass::Tiny,
        SizeClass::Small,
        SizeClass::Thrash,
        SizeClass::Full,
        SizeClass::Swap,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            SizeClass::Tiny => "tiny",
            SizeClass::Small => "small",
            SizeClass::Thrash => "thrash",
            SizeClass::Full => "full",
            SizeClass::Swap => "swap",
        }
    }

    /// Source/destination pair count for this class
    pub fn buffer_count(self, caps: &wringer_device::DeviceCaps) -> usize {
        const MB: u64 = 1 << 20;
        let count = match self {
            SizeClass::Tiny => MIN_BUFFERS as u64,
            SizeClass::Small => caps.mappable_aperture / MB / 4,
            SizeClass::Thrash => caps.mappable_aperture / MB,
            SizeClass::Full => caps.total_aperture / MB,
            SizeClass::Swap => (caps.avail_ram + caps.avail_swap / 2) / MB,
        };
        (count as usize).max(MIN_BUFFERS)
    }

    /// Reason this class cannot run, if any
    pub fn check(self, caps: &wringer_device::DeviceCaps, geometry: Geometry) -> Option<String> {
        if self == SizeClass::Swap && caps.avail_swap == 0 {
            return Some("device host has no swap".to_string());
        }
        let count = self.buffer_count(caps) as u64;
        let needed = (2 * count + 2) * geometry.size_bytes() as u64;
        let budget = caps.avail_ram + caps.avail_swap;
        (needed > budget).then(|| {
            format!(
                "working set of {} MiB exceeds the {} MiB memory budget",
                needed >> 20,
                budget >> 20
            )
        })
    }
}

/// One entry in the matrix
pub struct Case {
    pub name: String,
    pub kind: CaseKind,
}

pub enum CaseKind {
    Scenario {
        mem: MemKind,
        size: SizeClass,
        strategy: &'static dyn AccessStrategy,
        engine: &'static CopyEngine,
        scenario: &'static Scenario,
        wrapper: Wrapper,
        hang: HangKind,
    },
    /// Diagnostics baseline: idle devices report no error state
    ErrorStateBasic,
    /// Fault one queue and validate the captured crash record
    ErrorStateCapture { queue: Queue },
}

/// Build the case list. `exhaustive` adds the host-mediated engines
/// and the hang variants.
pub fn build_cases(exhaustive: bool) -> Vec<Case> {
    let mut cases = Vec::new();

    cases.push(Case {
        name: "error-state-basic".to_string(),
        kind: CaseKind::ErrorStateBasic,
    });
    for queue in Queue::ALL {
        cases.push(Case {
            name: format!("error-state-capture-{queue}"),
            kind: CaseKind::ErrorStateCapture { queue },
        });
    }

    for mem in [MemKind::Normal, MemKind::Private, MemKind::Stolen] {
        for size in SizeClass::ALL {
            for strategy in STRATEGIES {
                for engine in ENGINES {
                    if engine.exhaustive_only && !exhaustive {
                        continue;
                    }
                    for scenario in SCENARIOS {
                        for wrapper in Wrapper::ALL {
                            for hang in HangKind::ALL {
                                // hangs only cross with the plain wrapper
                                if hang != HangKind::None && (!exhaustive || wrapper != Wrapper::Single) {
                                    continue;
                                }
                                cases.push(Case {
                                    name: format!(
                                        "{}{}-{}-{}-{}{}{}",
                                        mem.prefix(),
                                        size.name(),
                                        strategy.name(),
                                        engine.name,
                                        scenario.name,
                                        wrapper.suffix(),
                                        hang.suffix()
                                    ),
                                    kind: CaseKind::Scenario {
                                        mem,
                                        size,
                                        strategy: *strategy,
                                        engine,
                                        scenario,
                                        wrapper,
                                        hang,
                                    },
                                });
                            }
                        }
                    }
                }
            }
        }
    }
    cases
}

/// Result of one case
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Skip { reason: String },
    Fail { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub results: Vec<CaseResult>,
}

impl Report {
    pub fn push(&mut self, name: String, outcome: Outcome) {
        self.results.push(CaseResult { name, outcome });
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome == Outcome::Pass).count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Skip { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Fail { .. }))
            .count()
    }

    pub fn any_failed(&self) -> bool {
        self.failed() > 0
    }
}

/// Run one case against a device
pub fn run_case(device: &dyn Device, case: &Case, geometry: Geometry) -> Outcome {
    match try_run(device, case, geometry) {
        Ok(outcome) => outcome,
        // combinations the device cannot express are skips, whatever
        // stage they surface at
        Err(CaseError::Device(DeviceError::OutOfMemory { requested, available })) => Outcome::Skip {
            reason: format!("out of device memory ({requested} requested, {available} available)"),
        },
        Err(CaseError::Device(DeviceError::Unsupported(reason))) => Outcome::Skip { reason },
        Err(e) => Outcome::Fail { error: e.to_string() },
    }
}

fn try_run(device: &dyn Device, case: &Case, geometry: Geometry) -> Result<Outcome, CaseError> {
    match &case.kind {
        CaseKind::ErrorStateBasic => {
            let h = Harness::open(device)?;
            hang::check_error_state_clear(&h)?;
            Ok(Outcome::Pass)
        }
        CaseKind::ErrorStateCapture { queue } => {
            let h = Harness::open(device)?;
            if let Some(reason) = HangKind::ALL
                .iter()
                .find(|k| k.queue() == Some(*queue))
                .and_then(|k| k.check(h.caps()))
            {
                return Ok(Outcome::Skip { reason });
            }
            hang::capture_crash_record(&h, *queue)?;
            Ok(Outcome::Pass)
        }
        CaseKind::Scenario {
            mem,
            size,
            strategy,
            engine,
            scenario,
            wrapper,
            hang,
        } => {
            let caps = Harness::open(device)?.caps().to_owned();

            let kind_ok = match mem {
                MemKind::Normal => true,
                MemKind::Private => caps.supports_private,
                MemKind::Stolen => caps.supports_stolen,
            };
            if !kind_ok {
                return Ok(Outcome::Skip {
                    reason: format!("device cannot create {}memory", mem.prefix()),
                });
            }
            let skip = strategy
                .check(&caps, *mem)
                .or_else(|| (engine.check)(&caps))
                .or_else(|| {
                    scenario
                        .queues
                        .iter()
                        .find(|q| !caps.has_queue(**q))
                        .map(|q| format!("device has no {q} queue"))
                })
                .or_else(|| hang.check(&caps))
                .or_else(|| size.check(&caps, geometry));
            if let Some(reason) = skip {
                return Ok(Outcome::Skip { reason });
            }

            let count = size.buffer_count(&caps);
            crate::wrapper::run(
                *wrapper, device, *strategy, *mem, geometry, count, scenario, engine, *hang,
            )?;
            Ok(Outcome::Pass)
        }
    }
}

/// Run every case whose name passes `filter`
pub fn run_matrix<F>(device: &dyn Device, cases: &[Case], geometry: Geometry, mut filter: F) -> Report
where
    F: FnMut(&str) -> bool,
{
    let mut report = Report::default();
    for case in cases {
        if !filter(&case.name) {
            continue;
        }
        tracing::info!(case = %case.name, "running");
        let outcome = run_case(device, case, geometry);
        match &outcome {
            Outcome::Pass => tracing::info!(case = %case.name, "pass"),
            Outcome::Skip { reason } => tracing::info!(case = %case.name, reason, "skip"),
            Outcome::Fail { error } => tracing::error!(case = %case.name, error, "FAIL"),
        }
        report.push(case.name.clone(), outcome);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use wringer_device::SimConfig;

    #[test]
    fn test_case_name_format() {
        let cases = build_cases(true);
        assert!(cases.iter().any(|c| c.name == "tiny-prw-blt-basic0"));
        assert!(cases.iter().any(|c| c.name == "small-cpu-wc-early-read-forked"));
        assert!(cases.iter().any(|c| c.name == "tiny-direct-render-basic1-hang-blt"));
        assert!(cases.iter().any(|c| c.name == "private-full-gpu-render-read-read-blt-bomb"));
        assert!(cases.iter().any(|c| c.name == "error-state-capture-render"));
    }

    #[test]
    fn test_reduced_matrix_has_no_hangs_or_host_engines() {
        let cases = build_cases(false);
        assert!(!cases.iter().any(|c| c.name.contains("-hang-")));
        assert!(!cases
            .iter()
            .any(|c| matches!(&c.kind, CaseKind::Scenario { engine, .. } if engine.exhaustive_only)));

        // mem(3) x size(5) x strategy(10) x engine(2) x scenario(17) x wrapper(5) + 3 diag cases
        assert_eq!(cases.len(), 3 * 5 * 10 * 2 * 17 * 5 + 3);
    }

    #[test]
    fn test_exhaustive_matrix_crosses_hangs_with_single_only() {
        let cases = build_cases(true);
        let scenario_cases = 3 * 5 * 10 * 5 * 17 * (5 + 2);
        assert_eq!(cases.len(), scenario_cases + 3);
        assert!(!cases.iter().any(|c| c.name.contains("-forked-hang-")));
    }

    #[test]
    fn test_size_classes_scale_with_caps() {
        let caps = SimConfig::default().caps();
        assert_eq!(SizeClass::Tiny.buffer_count(&caps), MIN_BUFFERS);
        assert_eq!(SizeClass::Thrash.buffer_count(&caps), 8);
        assert_eq!(SizeClass::Full.buffer_count(&caps), 16);
        assert!(SizeClass::Swap.check(&caps, Geometry::default()).is_some());
        assert!(SizeClass::Tiny.check(&caps, Geometry::default()).is_none());
    }
}
