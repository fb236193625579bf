//! Buffer sets shared by every scenario
//!
//! A scenario operates on `count` source/destination pairs plus a
//! spare, all created through one access strategy so set/compare
//! semantics match the strategy under test. GPU-side strategies also
//! get a snooped readback buffer for host comparison.

use wringer_device::{BufferHandle, CachingMode, MemKind, Tiling};

use crate::access::AccessStrategy;
use crate::context::Harness;
use crate::error::Result;

/// Smallest buffer count any size class will use
pub const MIN_BUFFERS: usize = 3;

/// 2D extent of every buffer in a set, in 32-bit elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: usize,
    pub height: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
        }
    }
}

impl Geometry {
    pub const fn npixels(&self) -> usize {
        self.width * self.height
    }

    pub const fn size_bytes(&self) -> usize {
        self.npixels() * 4
    }
}

/// One buffer under test, with whatever persistent mapping its access
/// strategy established at creation
pub struct TestBuffer {
    pub handle: BufferHandle,
    pub width: usize,
    pub height: usize,
    pub tiling: Tiling,
    pub map: Option<wringer_device::Mapping>,
}

impl TestBuffer {
    pub const fn npixels(&self) -> usize {
        self.width * self.height
    }

    pub const fn size_bytes(&self) -> usize {
        self.npixels() * 4
    }
}

/// Role-based reference into a [`BufferSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufRef {
    Src(usize),
    Dst(usize),
    Spare,
}

/// The working set for one scenario run
pub struct BufferSet {
    pub strategy: &'static dyn AccessStrategy,
    pub geometry: Geometry,
    pub src: Vec<TestBuffer>,
    pub dst: Vec<TestBuffer>,
    pub spare: TestBuffer,
    /// Snooped readback buffer for GPU-side comparison
    pub snoop: Option<TestBuffer>,
}

impl BufferSet {
    pub fn create(
        h: &Harness,
        strategy: &'static dyn AccessStrategy,
        kind: MemKind,
        geometry: Geometry,
        count: usize,
    ) -> Result<Self> {
        tracing::debug!(
            strategy = strategy.name(),
            ?kind,
            count,
            width = geometry.width,
            height = geometry.height,
            "creating buffer set"
        );

        let mut src = Vec::with_capacity(count);
        let mut dst = Vec::with_capacity(count);
        for _ in 0..count {
            src.push(strategy.create(h, kind, geometry)?);
            dst.push(strategy.create(h, kind, geometry)?);
        }
        let spare = strategy.create(h, kind, geometry)?;

        let snoop = if strategy.needs_snoop() {
            Some(create_snoop(h, geometry)?)
        } else {
            None
        };

        Ok(Self {
            strategy,
            geometry,
            src,
            dst,
            spare,
            snoop,
        })
    }

    pub fn count(&self) -> usize {
        self.src.len()
    }

    pub fn get(&self, r: BufRef) -> &TestBuffer {
        match r {
            BufRef::Src(i) => &self.src[i],
            BufRef::Dst(i) => &self.dst[i],
            BufRef::Spare => &self.spare,
        }
    }

    /// Set every element of the referenced buffer to `val` through the
    /// set's access strategy
    pub fn set(&self, h: &Harness, r: BufRef, val: u32) -> Result<()> {
        self.strategy.set(h, self.get(r), val)
    }

    /// Check the referenced buffer holds `val` through the set's
    /// access strategy
    pub fn cmp(&self, h: &Harness, r: BufRef, val: u32) -> Result<()> {
        self.strategy.cmp(h, self.get(r), self.snoop.as_ref(), val)
    }

    pub fn destroy(mut self, h: &Harness) -> Result<()> {
        for buf in self.src.iter_mut().chain(self.dst.iter_mut()) {
            self.strategy.release(h, buf)?;
        }
        self.strategy.release(h, &mut self.spare)?;
        if let Some(snoop) = self.snoop.as_mut() {
            snoop.map = None;
            h.ctx().close_buffer(snoop.handle)?;
        }
        Ok(())
    }
}

/// Host-coherent readback target: snooped when the device lacks a
/// shared cache, plain otherwise
fn create_snoop(h: &Harness, geometry: Geometry) -> Result<TestBuffer> {
    let handle = h.ctx().create(MemKind::Normal, geometry.size_bytes())?;
    if !h.caps().llc {
        h.ctx().set_caching(handle, CachingMode::Snooped)?;
    }
    Ok(TestBuffer {
        handle,
        width: geometry.width,
        height: geometry.height,
        tiling: Tiling::None,
        map: None,
    })
}
