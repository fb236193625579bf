//! Concurrency wrappers
//!
//! Each wrapper decides how many executors run a scenario, with what
//! buffer sets, and for how many passes. Every wrapper ends the same
//! way: the missed-notification counter must still be zero.
//!
//! Executors are threads, each with its own device connection:
//! - single: one executor, one pass
//! - child: one extra executor runs the pass over the parent's set
//! - interruptible: one executor repeats under an interrupt storm
//! - forked: one executor per CPU, private sets, several passes
//! - bomb: 8x oversubscribed executors, private sets, several passes

use rayon::prelude::*;
use wringer_device::{Device, MemKind};

use crate::access::AccessStrategy;
use crate::buffers::{BufferSet, Geometry, MIN_BUFFERS};
use crate::context::Harness;
use crate::copy::CopyEngine;
use crate::error::{CaseError, Result};
use crate::hang::HangKind;
use crate::scenario::Scenario;

/// Passes per executor for the repeating wrappers
const LOOPS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    Single,
    Child,
    Forked,
    Interruptible,
    Bomb,
}

impl Wrapper {
    pub const ALL: [Wrapper; 5] = [
        Wrapper::Single,
        Wrapper::Child,
        Wrapper::Forked,
        Wrapper::Interruptible,
        Wrapper::Bomb,
    ];

    pub const fn suffix(self) -> &'static str {
        match self {
            Wrapper::Single => "",
            Wrapper::Child => "-child",
            Wrapper::Forked => "-forked",
            Wrapper::Interruptible => "-interruptible",
            Wrapper::Bomb => "-bomb",
        }
    }

    fn executors(self) -> usize {
        match self {
            Wrapper::Forked => rayon::current_num_threads(),
            Wrapper::Bomb => 8 * rayon::current_num_threads(),
            _ => 1,
        }
    }
}

/// Run one scenario/engine/hang combination under a wrapper
#[allow(clippy::too_many_arguments)]
pub fn run(
    wrapper: Wrapper,
    device: &dyn Device,
    strategy: &'static dyn AccessStrategy,
    kind: MemKind,
    geometry: Geometry,
    count: usize,
    scenario: &Scenario,
    engine: &CopyEngine,
    hang: HangKind,
) -> Result<()> {
    let mut h = Harness::open(device)?;
    h.clear_missed_notifications()?;

    match wrapper {
        Wrapper::Single => {
            let set = BufferSet::create(&h, strategy, kind, geometry, count)?;
            let result = (scenario.run)(&h, &set, engine, hang);
            set.destroy(&h)?;
            result?;
        }
        Wrapper::Child => {
            // the child executor works on the parent's buffers through
            // its own connection
            let set = BufferSet::create(&h, strategy, kind, geometry, count)?;
            let result = std::thread::scope(|scope| {
                scope
                    .spawn(|| -> Result<()> {
                        let child = Harness::open(device)?;
                        (scenario.run)(&child, &set, engine, hang)
                    })
                    .join()
                    .map_err(|_| CaseError::WorkerPanicked)?
            });
            set.destroy(&h)?;
            result?;
        }
        Wrapper::Interruptible => {
            let set = BufferSet::create(&h, strategy, kind, geometry, count)?;
            h.ctx().set_interrupt_storm(true);
            let result = (0..LOOPS).try_for_each(|pass| {
                h.pass = pass;
                (scenario.run)(&h, &set, engine, hang)
            });
            h.ctx().set_interrupt_storm(false);
            set.destroy(&h)?;
            result?;
        }
        Wrapper::Forked | Wrapper::Bomb => {
            let executors = wrapper.executors();
            let per_executor = count / executors + MIN_BUFFERS;
            tracing::debug!(executors, per_executor, "spawning wrapped executors");
            (0..executors).into_par_iter().try_for_each(|_| -> Result<()> {
                let mut child = Harness::open(device)?;
                let set = BufferSet::create(&child, strategy, kind, geometry, per_executor)?;
                let result = (0..LOOPS).try_for_each(|pass| {
                    child.pass = pass;
                    (scenario.run)(&child, &set, engine, hang)
                });
                set.destroy(&child)?;
                result
            })?;
        }
    }

    h.check_missed_notifications()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{access, copy, scenario};
    use wringer_device::SimDevice;

    fn tiny() -> Geometry {
        Geometry {
            width: 32,
            height: 32,
        }
    }

    fn run_wrapper(wrapper: Wrapper) -> Result<()> {
        let device = SimDevice::default();
        run(
            wrapper,
            &device,
            access::by_name("prw").unwrap(),
            MemKind::Normal,
            tiny(),
            MIN_BUFFERS,
            scenario::by_name("basic1").unwrap(),
            copy::by_name("blt").unwrap(),
            HangKind::None,
        )
    }

    #[test]
    fn test_single_wrapper() {
        run_wrapper(Wrapper::Single).unwrap();
    }

    #[test]
    fn test_child_wrapper() {
        run_wrapper(Wrapper::Child).unwrap();
    }

    #[test]
    fn test_interruptible_wrapper() {
        run_wrapper(Wrapper::Interruptible).unwrap();
    }

    #[test]
    fn test_forked_wrapper() {
        run_wrapper(Wrapper::Forked).unwrap();
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(Wrapper::Single.suffix(), "");
        assert_eq!(Wrapper::Child.suffix(), "-child");
        assert_eq!(Wrapper::Forked.suffix(), "-forked");
        assert_eq!(Wrapper::Interruptible.suffix(), "-interruptible");
        assert_eq!(Wrapper::Bomb.suffix(), "-bomb");
    }
}
