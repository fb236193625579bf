//! Cross-cutting coherency properties
//!
//! Whatever path wrote a buffer and whatever path copies it, a compare
//! through any strategy must observe the copied value, and sources may
//! be rewritten the moment the copy is submitted.

use wringer_device::{MemKind, SimConfig, SimDevice};
use wringer_harness::access::{self, STRATEGIES};
use wringer_harness::buffers::{BufRef, BufferSet, Geometry, MIN_BUFFERS};
use wringer_harness::copy::{self, ENGINES};
use wringer_harness::scenario;
use wringer_harness::{CaseError, HangKind, Harness, Wrapper};

fn small() -> Geometry {
    Geometry {
        width: 64,
        height: 64,
    }
}

const SAMPLE_VALUES: [u32; 3] = [0, !0, 0xdeadbeef];

/// Every strategy/engine pair moves every sampled value intact
#[test]
fn test_all_strategy_engine_pairs_roundtrip() {
    // no shared cache, so the snooped strategy participates too
    let device = SimDevice::new(SimConfig::without_llc());
    let h = Harness::open(&device).unwrap();

    for strategy in STRATEGIES {
        if strategy.check(h.caps(), MemKind::Normal).is_some() {
            continue;
        }
        for engine in ENGINES {
            if (engine.check)(h.caps()).is_some() {
                continue;
            }
            let set = BufferSet::create(&h, *strategy, MemKind::Normal, small(), 1).unwrap();
            for val in SAMPLE_VALUES {
                set.set(&h, BufRef::Src(0), val).unwrap();
                (engine.copy)(&h, set.get(BufRef::Dst(0)), set.get(BufRef::Src(0))).unwrap();
                set.cmp(&h, BufRef::Dst(0), val)
                    .unwrap_or_else(|e| panic!("{}-{}: {e}", strategy.name(), engine.name));
            }
            set.destroy(&h).unwrap();
        }
    }
}

/// A copy snapshots its source: overwriting the source immediately
/// after submission must not leak into the destination
#[test]
fn test_copy_snapshots_source_across_engines() {
    let device = SimDevice::default();
    let h = Harness::open(&device).unwrap();
    let strategy = access::by_name("prw").unwrap();

    for engine in ENGINES {
        if (engine.check)(h.caps()).is_some() {
            continue;
        }
        let set = BufferSet::create(&h, strategy, MemKind::Normal, small(), 1).unwrap();
        set.set(&h, BufRef::Src(0), 0x11111111).unwrap();
        (engine.copy)(&h, set.get(BufRef::Dst(0)), set.get(BufRef::Src(0))).unwrap();
        set.set(&h, BufRef::Src(0), 0x22222222).unwrap();
        set.cmp(&h, BufRef::Dst(0), 0x11111111)
            .unwrap_or_else(|e| panic!("{}: {e}", engine.name));
        set.destroy(&h).unwrap();
    }
}

/// basic1 with three pairs leaves dst[i] == i everywhere, byte for
/// byte
#[test]
fn test_basic1_concrete_contents() {
    let device = SimDevice::default();
    let h = Harness::open(&device).unwrap();
    let strategy = access::by_name("prw").unwrap();
    let engine = copy::by_name("blt").unwrap();
    let basic1 = scenario::by_name("basic1").unwrap();

    let set = BufferSet::create(&h, strategy, MemKind::Normal, small(), MIN_BUFFERS).unwrap();
    (basic1.run)(&h, &set, engine, HangKind::None).unwrap();

    for i in 0..MIN_BUFFERS {
        set.cmp(&h, BufRef::Dst(i), i as u32).unwrap();
        set.cmp(&h, BufRef::Src(i), i as u32).unwrap();
    }
    set.destroy(&h).unwrap();
}

/// Scenarios are rerunnable over the same buffer set
#[test]
fn test_scenarios_are_idempotent() {
    let device = SimDevice::default();
    let h = Harness::open(&device).unwrap();
    let strategy = access::by_name("cpu").unwrap();
    let engine = copy::by_name("render").unwrap();
    let overwrite = scenario::by_name("overwrite-source").unwrap();

    let set = BufferSet::create(&h, strategy, MemKind::Normal, small(), MIN_BUFFERS).unwrap();
    (overwrite.run)(&h, &set, engine, HangKind::None).unwrap();
    (overwrite.run)(&h, &set, engine, HangKind::None).unwrap();
    set.destroy(&h).unwrap();
}

/// Every wrapper fails the run when the device loses completion
/// notifications, even though all content checks pass
#[test]
fn test_wrappers_fail_on_missed_notifications() {
    let device = SimDevice::new(SimConfig::dropping_notifications());

    for wrapper in [Wrapper::Single, Wrapper::Child, Wrapper::Interruptible] {
        let result = wringer_harness::wrapper::run(
            wrapper,
            &device,
            access::by_name("prw").unwrap(),
            MemKind::Normal,
            small(),
            MIN_BUFFERS,
            scenario::by_name("basic0").unwrap(),
            copy::by_name("blt").unwrap(),
            HangKind::None,
        );
        assert!(
            matches!(result, Err(CaseError::MissedNotifications { .. })),
            "{wrapper:?}: {result:?}"
        );
    }
}

/// Hang variants recover without corrupting any scheduled copy
#[test]
fn test_hangs_do_not_corrupt_results() {
    let device = SimDevice::default();

    for hang in [HangKind::Blt, HangKind::Render] {
        wringer_harness::wrapper::run(
            Wrapper::Single,
            &device,
            access::by_name("prw").unwrap(),
            MemKind::Normal,
            small(),
            MIN_BUFFERS,
            scenario::by_name("basicN").unwrap(),
            copy::by_name("blt").unwrap(),
            hang,
        )
        .unwrap();
    }
}
