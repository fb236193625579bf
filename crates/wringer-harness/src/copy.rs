//! Copy engines
//!
//! The five pipelines that move one buffer's contents into another:
//! three host-mediated paths (cached, direct, write-combined) and the
//! two device queues. Queue copies return after submission; scenarios
//! rely on the later compare to synchronize.

use wringer_device::{CopyParams, DeviceCaps, Domain, MapKind, Queue, Tiling};

use crate::buffers::TestBuffer;
use crate::context::Harness;
use crate::error::Result;

pub struct CopyEngine {
    pub name: &'static str,
    /// Host-mediated paths only run in the exhaustive matrix
    pub exhaustive_only: bool,
    pub check: fn(&DeviceCaps) -> Option<String>,
    pub copy: fn(&Harness, dst: &TestBuffer, src: &TestBuffer) -> Result<()>,
}

/// All copy engines, in matrix order
pub static ENGINES: &[CopyEngine] = &[
    CopyEngine {
        name: "cpu",
        exhaustive_only: true,
        check: |_| None,
        copy: cpu_copy,
    },
    CopyEngine {
        name: "direct",
        exhaustive_only: true,
        check: |_| None,
        copy: direct_copy,
    },
    CopyEngine {
        name: "wc",
        exhaustive_only: true,
        check: |caps| (!caps.supports_wc_map).then(|| "device has no write-combined mapping support".to_string()),
        copy: wc_copy,
    },
    CopyEngine {
        name: "blt",
        exhaustive_only: false,
        check: |caps| (!caps.has_blt).then(|| "device has no blit queue".to_string()),
        copy: |h, dst, src| queue_copy(h, Queue::Blt, dst, src),
    },
    CopyEngine {
        name: "render",
        exhaustive_only: false,
        check: |caps| (!caps.has_render).then(|| "device has no render queue".to_string()),
        copy: |h, dst, src| queue_copy(h, Queue::Render, dst, src),
    },
];

pub fn by_name(name: &str) -> Option<&'static CopyEngine> {
    ENGINES.iter().find(|e| e.name == name)
}

/// Submit a copy on the named queue. Strides are encoded the way the
/// command expects them: elements for tiled layouts, bytes for linear.
pub fn queue_copy(h: &Harness, queue: Queue, dst: &TestBuffer, src: &TestBuffer) -> Result<()> {
    let dst_tiled = dst.tiling == Tiling::X;
    let src_tiled = src.tiling == Tiling::X;
    let params = CopyParams {
        row_bytes: (dst.width * 4) as u32,
        rows: dst.height as u32,
        dst_stride: if dst_tiled { dst.width as u32 } else { (dst.width * 4) as u32 },
        src_stride: if src_tiled { src.width as u32 } else { (src.width * 4) as u32 },
        dst_tiled,
        src_tiled,
    };
    Ok(h.ctx().submit_copy(queue, dst.handle, src.handle, &params)?)
}

fn host_copy(h: &Harness, dst: &TestBuffer, src: &TestBuffer, kind: MapKind, domain: Domain) -> Result<()> {
    let src_map = h.ctx().map(src.handle, kind)?;
    let dst_map = h.ctx().map(dst.handle, kind)?;
    h.ctx().set_domain(src.handle, domain, None)?;
    h.ctx().set_domain(dst.handle, domain, Some(domain))?;

    let mut bytes = vec![0u8; src.size_bytes()];
    src_map.read(0, &mut bytes)?;
    dst_map.write(0, &bytes)?;
    Ok(())
}

fn cpu_copy(h: &Harness, dst: &TestBuffer, src: &TestBuffer) -> Result<()> {
    host_copy(h, dst, src, MapKind::Cached, Domain::Cpu)
}

fn direct_copy(h: &Harness, dst: &TestBuffer, src: &TestBuffer) -> Result<()> {
    host_copy(h, dst, src, MapKind::Direct, Domain::Device)
}

fn wc_copy(h: &Harness, dst: &TestBuffer, src: &TestBuffer) -> Result<()> {
    host_copy(h, dst, src, MapKind::WriteCombined, Domain::Device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access;
    use crate::buffers::Geometry;
    use wringer_device::{MemKind, SimDevice};

    fn pair(h: &Harness) -> (TestBuffer, TestBuffer) {
        let strategy = access::by_name("prw").unwrap();
        let geometry = Geometry {
            width: 64,
            height: 64,
        };
        (
            strategy.create(h, MemKind::Normal, geometry).unwrap(),
            strategy.create(h, MemKind::Normal, geometry).unwrap(),
        )
    }

    #[test]
    fn test_all_engines_copy_correctly() {
        let device = SimDevice::default();
        let h = Harness::open(&device).unwrap();
        let strategy = access::by_name("prw").unwrap();

        for engine in ENGINES {
            let (src, dst) = pair(&h);
            strategy.set(&h, &src, 0xdeadbeef).unwrap();
            (engine.copy)(&h, &dst, &src).unwrap();
            strategy.cmp(&h, &dst, None, 0xdeadbeef).unwrap();

            h.ctx().close_buffer(src.handle).unwrap();
            h.ctx().close_buffer(dst.handle).unwrap();
        }
    }

    #[test]
    fn test_queue_engines_run_in_reduced_matrix() {
        assert!(!by_name("blt").unwrap().exhaustive_only);
        assert!(!by_name("render").unwrap().exhaustive_only);
        assert!(by_name("cpu").unwrap().exhaustive_only);
        assert!(by_name("direct").unwrap().exhaustive_only);
        assert!(by_name("wc").unwrap().exhaustive_only);
    }
}
