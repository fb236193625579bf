//! Scenarios: the operation orderings under test
//!
//! Each scenario is a fixed sequence of sets, copies and compares over
//! a [`BufferSet`], written so that coherency bugs show up as content
//! mismatches. The copy engine is a parameter; scenarios that pin work
//! to a specific queue (`*-blt`, `*-render`, `intermix-*`) submit
//! there directly on top of whatever the engine does.
//!
//! The hang parameter stalls one queue mid-scenario; every content
//! check must still pass across the recovery.

use wringer_device::Queue;

use crate::buffers::BufRef::{Dst, Spare, Src};
use crate::buffers::BufferSet;
use crate::context::Harness;
use crate::copy::{queue_copy, CopyEngine};
use crate::error::Result;
use crate::hang::HangKind;

type Run = fn(&Harness, &BufferSet, &CopyEngine, HangKind) -> Result<()>;

pub struct Scenario {
    pub name: &'static str,
    /// Queues the scenario submits to directly, besides the engine
    pub queues: &'static [Queue],
    pub run: Run,
}

/// All scenarios, in matrix order
pub static SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "basic0",
        queues: &[],
        run: basic0,
    },
    Scenario {
        name: "basic1",
        queues: &[],
        run: basic1,
    },
    Scenario {
        name: "basicN",
        queues: &[],
        run: basic_n,
    },
    Scenario {
        name: "overwrite-source-one",
        queues: &[],
        run: overwrite_source_one,
    },
    Scenario {
        name: "overwrite-source",
        queues: &[],
        run: overwrite_source,
    },
    Scenario {
        name: "overwrite-source-read-blt",
        queues: &[Queue::Blt],
        run: overwrite_source_read_blt,
    },
    Scenario {
        name: "overwrite-source-read-render",
        queues: &[Queue::Render],
        run: overwrite_source_read_render,
    },
    Scenario {
        name: "overwrite-source-rev",
        queues: &[],
        run: overwrite_source_rev,
    },
    Scenario {
        name: "intermix-render",
        queues: &[Queue::Render],
        run: intermix_render,
    },
    Scenario {
        name: "intermix-blt",
        queues: &[Queue::Blt],
        run: intermix_blt,
    },
    Scenario {
        name: "intermix-both",
        queues: &[Queue::Blt, Queue::Render],
        run: intermix_both,
    },
    Scenario {
        name: "early-read",
        queues: &[],
        run: early_read,
    },
    Scenario {
        name: "read-read-blt",
        queues: &[Queue::Blt],
        run: read_read_blt,
    },
    Scenario {
        name: "read-read-render",
        queues: &[Queue::Render],
        run: read_read_render,
    },
    Scenario {
        name: "write-read-blt",
        queues: &[Queue::Blt],
        run: write_read_blt,
    },
    Scenario {
        name: "write-read-render",
        queues: &[Queue::Render],
        run: write_read_render,
    },
    Scenario {
        name: "gpu-read-after-write",
        queues: &[],
        run: gpu_read_after_write,
    },
];

pub fn by_name(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

/// One source fanned out to every destination
fn basic0(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind) -> Result<()> {
    h.ctx().quiesce()?;
    b.set(h, Src(0), 0xdeadbeef)?;
    for i in 0..b.count() {
        let guard = hang.inject(h)?;
        (engine.copy)(h, b.get(Dst(i)), b.get(Src(0)))?;
        b.cmp(h, Dst(i), 0xdeadbeef)?;
        guard.confirm(h)?;
    }
    Ok(())
}

/// Pairwise copies, checked one at a time
fn basic1(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind) -> Result<()> {
    h.ctx().quiesce()?;
    for i in 0..b.count() {
        let guard = hang.inject(h)?;
        let v = i as u32;
        b.set(h, Src(i), v)?;
        b.set(h, Dst(i), !v)?;
        (engine.copy)(h, b.get(Dst(i)), b.get(Src(i)))?;
        std::thread::yield_now(); // let another submitter claim the device
        b.cmp(h, Dst(i), v)?;
        guard.confirm(h)?;
    }
    Ok(())
}

/// Pairwise copies, all in flight before any check
fn basic_n(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind) -> Result<()> {
    h.ctx().quiesce()?;
    for i in 0..b.count() {
        let v = i as u32;
        b.set(h, Src(i), v)?;
        b.set(h, Dst(i), !v)?;
    }
    let guard = hang.inject(h)?;
    for i in 0..b.count() {
        (engine.copy)(h, b.get(Dst(i)), b.get(Src(i)))?;
        std::thread::yield_now();
    }
    for i in 0..b.count() {
        b.cmp(h, Dst(i), i as u32)?;
    }
    guard.confirm(h)
}

/// A source rewritten right after one copy: the destination must keep
/// the pre-overwrite contents
fn overwrite_source_one(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind) -> Result<()> {
    h.ctx().quiesce()?;
    b.set(h, Src(0), 0)?;
    b.set(h, Dst(0), !0)?;

    (engine.copy)(h, b.get(Dst(0)), b.get(Src(0)))?;
    let guard = hang.inject(h)?;
    b.set(h, Src(0), 0xdeadbeef)?;
    b.cmp(h, Dst(0), 0)?;
    guard.confirm(h)
}

fn overwrite_source(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind) -> Result<()> {
    h.ctx().quiesce()?;
    for i in 0..b.count() {
        b.set(h, Src(i), i as u32)?;
        b.set(h, Dst(i), !(i as u32))?;
    }
    for i in 0..b.count() {
        (engine.copy)(h, b.get(Dst(i)), b.get(Src(i)))?;
    }
    let guard = hang.inject(h)?;
    for i in (0..b.count()).rev() {
        b.set(h, Src(i), 0xdeadbeef)?;
    }
    for i in 0..b.count() {
        b.cmp(h, Dst(i), i as u32)?;
    }
    guard.confirm(h)
}

/// Overwrite while a second queue is still reading each source
fn overwrite_source_read(
    h: &Harness,
    b: &BufferSet,
    engine: &CopyEngine,
    hang: HangKind,
    reader: Queue,
) -> Result<()> {
    let half = b.count() / 2;
    h.ctx().quiesce()?;
    for i in 0..half {
        b.set(h, Src(i), i as u32)?;
        b.set(h, Dst(i), !(i as u32))?;
        b.set(h, Dst(i + half), !(i as u32))?;
    }
    for i in 0..half {
        (engine.copy)(h, b.get(Dst(i)), b.get(Src(i)))?;
        queue_copy(h, reader, b.get(Dst(i + half)), b.get(Src(i)))?;
    }
    let guard = hang.inject(h)?;
    for i in (0..half).rev() {
        b.set(h, Src(i), 0xdeadbeef)?;
    }
    for i in 0..half {
        b.cmp(h, Dst(i), i as u32)?;
        b.cmp(h, Dst(i + half), i as u32)?;
    }
    guard.confirm(h)
}

fn overwrite_source_read_blt(h: &Harness, b: &BufferSet, e: &CopyEngine, hang: HangKind) -> Result<()> {
    overwrite_source_read(h, b, e, hang, Queue::Blt)
}

fn overwrite_source_read_render(h: &Harness, b: &BufferSet, e: &CopyEngine, hang: HangKind) -> Result<()> {
    overwrite_source_read(h, b, e, hang, Queue::Render)
}

/// As overwrite-source, but overwriting forward and checking in
/// reverse
fn overwrite_source_rev(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind) -> Result<()> {
    h.ctx().quiesce()?;
    for i in 0..b.count() {
        b.set(h, Src(i), i as u32)?;
        b.set(h, Dst(i), !(i as u32))?;
    }
    for i in 0..b.count() {
        (engine.copy)(h, b.get(Dst(i)), b.get(Src(i)))?;
    }
    let guard = hang.inject(h)?;
    for i in 0..b.count() {
        b.set(h, Src(i), 0xdeadbeef)?;
    }
    for i in (0..b.count()).rev() {
        b.cmp(h, Dst(i), i as u32)?;
    }
    guard.confirm(h)
}

/// Queue copies interleaved with the engine under test: each iteration
/// clobbers dst[i] from a queue, has the engine stage src[i] into
/// dst[i+half], chains dst[i+half] back into dst[i] from a second
/// queue, then the engine repairs dst[i+half]. Every destination is
/// written twice, across submitters.
/// `select`: 1 = render, 0 = blt, -1 = alternate per iteration.
fn intermix(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind, select: i32) -> Result<()> {
    let half = b.count() / 2;
    h.ctx().quiesce()?;
    for i in 0..b.count() {
        b.set(h, Src(i), 0xdeadbeef ^ !(i as u32))?;
        b.set(h, Dst(i), i as u32)?;
    }
    for i in 0..half {
        let first = if select == 1 || (select == -1 && i & 1 == 1) {
            Queue::Render
        } else {
            Queue::Blt
        };
        let second = if select == 1 || (select == -1 && i & 1 == 0) {
            Queue::Render
        } else {
            Queue::Blt
        };
        queue_copy(h, first, b.get(Dst(i)), b.get(Src(i)))?;
        (engine.copy)(h, b.get(Dst(i + half)), b.get(Src(i)))?;
        queue_copy(h, second, b.get(Dst(i)), b.get(Dst(i + half)))?;
        (engine.copy)(h, b.get(Dst(i + half)), b.get(Src(i + half)))?;
    }
    let guard = hang.inject(h)?;
    for i in 0..2 * half {
        b.cmp(h, Dst(i), 0xdeadbeef ^ !(i as u32))?;
    }
    guard.confirm(h)
}

fn intermix_render(h: &Harness, b: &BufferSet, e: &CopyEngine, hang: HangKind) -> Result<()> {
    intermix(h, b, e, hang, 1)
}

fn intermix_blt(h: &Harness, b: &BufferSet, e: &CopyEngine, hang: HangKind) -> Result<()> {
    intermix(h, b, e, hang, 0)
}

fn intermix_both(h: &Harness, b: &BufferSet, e: &CopyEngine, hang: HangKind) -> Result<()> {
    intermix(h, b, e, hang, -1)
}

/// Read the destinations back newest-copy-first
fn early_read(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind) -> Result<()> {
    h.ctx().quiesce()?;
    for i in (0..b.count()).rev() {
        b.set(h, Src(i), 0xdeadbeef)?;
    }
    for i in 0..b.count() {
        (engine.copy)(h, b.get(Dst(i)), b.get(Src(i)))?;
    }
    let guard = hang.inject(h)?;
    for i in (0..b.count()).rev() {
        b.cmp(h, Dst(i), 0xdeadbeef)?;
    }
    guard.confirm(h)
}

/// Two queues reading each source concurrently
fn read_read(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind, reader: Queue) -> Result<()> {
    h.ctx().quiesce()?;
    for i in (0..b.count()).rev() {
        b.set(h, Src(i), 0xdeadbeef ^ i as u32)?;
    }
    for i in 0..b.count() {
        (engine.copy)(h, b.get(Dst(i)), b.get(Src(i)))?;
        queue_copy(h, reader, b.get(Spare), b.get(Src(i)))?;
    }
    b.cmp(h, Spare, 0xdeadbeef ^ (b.count() as u32 - 1))?;
    let guard = hang.inject(h)?;
    for i in (0..b.count()).rev() {
        b.cmp(h, Dst(i), 0xdeadbeef ^ i as u32)?;
    }
    guard.confirm(h)
}

fn read_read_blt(h: &Harness, b: &BufferSet, e: &CopyEngine, hang: HangKind) -> Result<()> {
    read_read(h, b, e, hang, Queue::Blt)
}

fn read_read_render(h: &Harness, b: &BufferSet, e: &CopyEngine, hang: HangKind) -> Result<()> {
    read_read(h, b, e, hang, Queue::Render)
}

/// A queue stages each source through the spare, and the engine reads
/// the spare straight back out while the write is still in flight
fn write_read(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind, writer: Queue) -> Result<()> {
    h.ctx().quiesce()?;
    for i in (0..b.count()).rev() {
        b.set(h, Src(i), 0xdeadbeef ^ i as u32)?;
    }
    for i in 0..b.count() {
        queue_copy(h, writer, b.get(Spare), b.get(Src(i)))?;
        (engine.copy)(h, b.get(Dst(i)), b.get(Spare))?;
    }
    let guard = hang.inject(h)?;
    for i in (0..b.count()).rev() {
        b.cmp(h, Dst(i), 0xdeadbeef ^ i as u32)?;
    }
    guard.confirm(h)
}

fn write_read_blt(h: &Harness, b: &BufferSet, e: &CopyEngine, hang: HangKind) -> Result<()> {
    write_read(h, b, e, hang, Queue::Blt)
}

fn write_read_render(h: &Harness, b: &BufferSet, e: &CopyEngine, hang: HangKind) -> Result<()> {
    write_read(h, b, e, hang, Queue::Render)
}

/// Chain of copies ending back at the spare: src -> dst -> spare. The
/// destinations must survive being read back out in reverse
fn gpu_read_after_write(h: &Harness, b: &BufferSet, engine: &CopyEngine, hang: HangKind) -> Result<()> {
    h.ctx().quiesce()?;
    for i in (0..b.count()).rev() {
        b.set(h, Src(i), 0xabcdabcd)?;
    }
    for i in 0..b.count() {
        (engine.copy)(h, b.get(Dst(i)), b.get(Src(i)))?;
    }
    for i in (0..b.count()).rev() {
        (engine.copy)(h, b.get(Spare), b.get(Dst(i)))?;
    }
    let guard = hang.inject(h)?;
    for i in (0..b.count()).rev() {
        b.cmp(h, Dst(i), 0xabcdabcd)?;
    }
    guard.confirm(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access;
    use crate::buffers::{Geometry, MIN_BUFFERS};
    use crate::copy;
    use wringer_device::{MemKind, SimDevice};

    fn small() -> Geometry {
        Geometry {
            width: 64,
            height: 64,
        }
    }

    #[test]
    fn test_scenario_names_are_unique() {
        let mut names: Vec<_> = SCENARIOS.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SCENARIOS.len());
        assert_eq!(SCENARIOS.len(), 17);
    }

    #[test]
    fn test_all_scenarios_pass_with_queue_engines() {
        let device = SimDevice::default();
        let h = Harness::open(&device).unwrap();
        let strategy = access::by_name("prw").unwrap();

        for engine in ["blt", "render"].map(|n| copy::by_name(n).unwrap()) {
            for scenario in SCENARIOS {
                let set = crate::buffers::BufferSet::create(&h, strategy, MemKind::Normal, small(), MIN_BUFFERS + 1)
                    .unwrap();
                (scenario.run)(&h, &set, engine, HangKind::None)
                    .unwrap_or_else(|e| panic!("{}-{}: {e}", engine.name, scenario.name));
                set.destroy(&h).unwrap();
            }
        }
    }

    #[test]
    fn test_basic1_survives_a_blt_hang() {
        let device = SimDevice::default();
        let h = Harness::open(&device).unwrap();
        let strategy = access::by_name("prw").unwrap();
        let engine = copy::by_name("render").unwrap();

        let set = crate::buffers::BufferSet::create(&h, strategy, MemKind::Normal, small(), MIN_BUFFERS).unwrap();
        basic1(&h, &set, engine, HangKind::Blt).unwrap();
        set.destroy(&h).unwrap();
    }

    #[test]
    fn test_overwrite_source_survives_a_render_hang() {
        let device = SimDevice::default();
        let h = Harness::open(&device).unwrap();
        let strategy = access::by_name("prw").unwrap();
        let engine = copy::by_name("blt").unwrap();

        let set = crate::buffers::BufferSet::create(&h, strategy, MemKind::Normal, small(), MIN_BUFFERS).unwrap();
        overwrite_source(&h, &set, engine, HangKind::Render).unwrap();
        set.destroy(&h).unwrap();
    }

    /// Each intermix iteration must chain dst[i+half] back into dst[i]
    /// and then repair dst[i+half] from its own source, so both halves
    /// end up holding their own patterns
    #[test]
    fn test_intermix_rewrites_both_halves() {
        let device = SimDevice::default();
        let h = Harness::open(&device).unwrap();
        let strategy = access::by_name("prw").unwrap();
        let engine = copy::by_name("blt").unwrap();

        let set =
            crate::buffers::BufferSet::create(&h, strategy, MemKind::Normal, small(), MIN_BUFFERS + 1).unwrap();
        intermix_both(&h, &set, engine, HangKind::None).unwrap();
        for i in 0..set.count() {
            set.cmp(&h, Dst(i), 0xdeadbeef ^ !(i as u32)).unwrap();
        }
        set.destroy(&h).unwrap();
    }

    /// write-read stages every source through the spare before the
    /// engine reads it back out into the destination
    #[test]
    fn test_write_read_stages_through_spare() {
        let device = SimDevice::default();
        let h = Harness::open(&device).unwrap();
        let strategy = access::by_name("prw").unwrap();
        let engine = copy::by_name("render").unwrap();

        let set = crate::buffers::BufferSet::create(&h, strategy, MemKind::Normal, small(), MIN_BUFFERS).unwrap();
        write_read_blt(&h, &set, engine, HangKind::None).unwrap();
        for i in 0..set.count() {
            set.cmp(&h, Dst(i), 0xdeadbeef ^ i as u32).unwrap();
        }
        // the spare ends holding the last source staged through it
        set.cmp(&h, Spare, 0xdeadbeef ^ (set.count() as u32 - 1)).unwrap();
        set.destroy(&h).unwrap();
    }
}
