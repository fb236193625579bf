//! Access strategies
//!
//! Every way the host (or the device itself) can set and check buffer
//! contents. Each strategy owns the full lifecycle of its buffers:
//! creation (including tiling and persistent mappings), writing a
//! value pattern, comparing against one, and release.
//!
//! Slow paths compare a single sampled element per row instead of the
//! whole buffer; the sample rotates with the pass counter so repeated
//! passes cover different offsets.

use wringer_device::{
    CachingMode, CopyParams, DeviceCaps, Domain, FillParams, MapKind, MemKind, Queue, Tiling,
};

use crate::buffers::{Geometry, TestBuffer};
use crate::context::Harness;
use crate::error::{CaseError, Result};

pub trait AccessStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reason this strategy cannot run on the given device/memory
    /// combination, if any
    fn check(&self, caps: &DeviceCaps, kind: MemKind) -> Option<String>;

    /// Whether comparison goes through a snooped readback buffer
    fn needs_snoop(&self) -> bool {
        false
    }

    fn create(&self, h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer>;

    /// Set every element of `buf` to `val`
    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()>;

    /// Check `buf` holds `val` everywhere (or at sampled points, for
    /// slow paths)
    fn cmp(&self, h: &Harness, buf: &TestBuffer, snoop: Option<&TestBuffer>, val: u32) -> Result<()>;

    fn release(&self, h: &Harness, buf: &mut TestBuffer) -> Result<()> {
        // mappings must be gone before the handle can close
        buf.map = None;
        Ok(h.ctx().close_buffer(buf.handle)?)
    }
}

/// All access strategies, in matrix order
pub static STRATEGIES: &[&dyn AccessStrategy] = &[
    &Prw,
    &Partial,
    &CpuMap,
    &SnoopMap,
    &UserPtr,
    &DirectMap,
    &DirectMapTiled,
    &WcMap,
    &GpuFill,
    &GpuFillTiled,
];

pub fn by_name(name: &str) -> Option<&'static dyn AccessStrategy> {
    STRATEGIES.iter().copied().find(|s| s.name() == name)
}

// ================================================================================================
// Shared helpers
// ================================================================================================

fn plain_buffer(h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
    let handle = h.ctx().create(kind, geometry.size_bytes())?;
    Ok(TestBuffer {
        handle,
        width: geometry.width,
        height: geometry.height,
        tiling: Tiling::None,
        map: None,
    })
}

fn cmp_words(words: &[u32], val: u32) -> Result<()> {
    for (index, &actual) in words.iter().enumerate() {
        if actual != val {
            return Err(CaseError::CompareMismatch {
                index,
                expected: val,
                actual,
            });
        }
    }
    Ok(())
}

/// Full-buffer write through a cached mapping, bracketed by a CPU
/// domain transition
fn cpu_set(h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
    let map = h.ctx().map(buf.handle, MapKind::Cached)?;
    h.ctx().set_domain(buf.handle, Domain::Cpu, Some(Domain::Cpu))?;
    let words = vec![val; buf.npixels()];
    map.write(0, bytemuck::cast_slice(&words))?;
    Ok(())
}

fn cpu_cmp(h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
    let map = h.ctx().map(buf.handle, MapKind::Cached)?;
    h.ctx().set_domain(buf.handle, Domain::Cpu, None)?;
    let mut words = vec![0u32; buf.npixels()];
    map.read(0, bytemuck::cast_slice_mut(&mut words))?;
    cmp_words(&words, val)
}

/// Full write through a persistent device-visible mapping
fn mapped_set(h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
    let map = buf
        .map
        .as_ref()
        .ok_or_else(|| wringer_device::DeviceError::unsupported("strategy buffer lost its mapping"))?;
    h.ctx().set_domain(buf.handle, Domain::Device, Some(Domain::Device))?;
    let words = vec![val; buf.npixels()];
    map.write(0, bytemuck::cast_slice(&words))?;
    Ok(())
}

/// Sampled compare through a persistent device-visible mapping; reads
/// through the aperture are slow, so only one element per row is
/// checked
fn mapped_cmp_sampled(h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
    let map = buf
        .map
        .as_ref()
        .ok_or_else(|| wringer_device::DeviceError::unsupported("strategy buffer lost its mapping"))?;
    h.ctx().set_domain(buf.handle, Domain::Device, None)?;
    for y in 0..buf.height {
        let index = h.sample_index(y, buf.width);
        let actual = map.read_u32(index)?;
        if actual != val {
            return Err(CaseError::CompareMismatch {
                index,
                expected: val,
                actual,
            });
        }
    }
    Ok(())
}

fn mapped_cmp_full(h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
    let map = buf
        .map
        .as_ref()
        .ok_or_else(|| wringer_device::DeviceError::unsupported("strategy buffer lost its mapping"))?;
    h.ctx().set_domain(buf.handle, Domain::Device, None)?;
    let mut words = vec![0u32; buf.npixels()];
    map.read(0, bytemuck::cast_slice_mut(&mut words))?;
    cmp_words(&words, val)
}

// ================================================================================================
// Host transfer strategies
// ================================================================================================

/// Synchronized host transfers covering the whole buffer
struct Prw;

impl AccessStrategy for Prw {
    fn name(&self) -> &'static str {
        "prw"
    }

    fn check(&self, _caps: &DeviceCaps, kind: MemKind) -> Option<String> {
        (!kind.cpu_accessible()).then(|| "stolen memory is not host-transferable".to_string())
    }

    fn create(&self, h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
        plain_buffer(h, kind, geometry)
    }

    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
        let words = vec![val; buf.npixels()];
        Ok(h.ctx().pwrite(buf.handle, 0, bytemuck::cast_slice(&words))?)
    }

    fn cmp(&self, h: &Harness, buf: &TestBuffer, _snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
        let mut words = vec![0u32; buf.npixels()];
        h.ctx().pread(buf.handle, 0, bytemuck::cast_slice_mut(&mut words))?;
        cmp_words(&words, val)
    }
}

/// Synchronized host transfers touching one sampled element per row
struct Partial;

impl AccessStrategy for Partial {
    fn name(&self) -> &'static str {
        "partial"
    }

    fn check(&self, _caps: &DeviceCaps, kind: MemKind) -> Option<String> {
        (!kind.cpu_accessible()).then(|| "stolen memory is not host-transferable".to_string())
    }

    fn create(&self, h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
        plain_buffer(h, kind, geometry)
    }

    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
        for y in 0..buf.height {
            let index = h.sample_index(y, buf.width);
            h.ctx().pwrite(buf.handle, index * 4, &val.to_le_bytes())?;
        }
        Ok(())
    }

    fn cmp(&self, h: &Harness, buf: &TestBuffer, _snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
        for y in 0..buf.height {
            let index = h.sample_index(y, buf.width);
            let mut word = [0u8; 4];
            h.ctx().pread(buf.handle, index * 4, &mut word)?;
            let actual = u32::from_le_bytes(word);
            if actual != val {
                return Err(CaseError::CompareMismatch {
                    index,
                    expected: val,
                    actual,
                });
            }
        }
        Ok(())
    }
}

// ================================================================================================
// Mapping strategies
// ================================================================================================

/// Cached mappings with explicit domain transitions
struct CpuMap;

impl AccessStrategy for CpuMap {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn check(&self, _caps: &DeviceCaps, kind: MemKind) -> Option<String> {
        (!kind.cpu_accessible()).then(|| "stolen memory cannot be mapped cached".to_string())
    }

    fn create(&self, h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
        plain_buffer(h, kind, geometry)
    }

    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
        cpu_set(h, buf, val)
    }

    fn cmp(&self, h: &Harness, buf: &TestBuffer, _snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
        cpu_cmp(h, buf, val)
    }
}

/// Cached mappings over snooped pages; only meaningful without a
/// shared last-level cache
struct SnoopMap;

impl AccessStrategy for SnoopMap {
    fn name(&self) -> &'static str {
        "snoop"
    }

    fn check(&self, caps: &DeviceCaps, kind: MemKind) -> Option<String> {
        if caps.llc {
            return Some("snooped caching is redundant with a shared last-level cache".to_string());
        }
        (!kind.cpu_accessible()).then(|| "stolen memory cannot be snooped".to_string())
    }

    fn create(&self, h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
        let buf = plain_buffer(h, kind, geometry)?;
        h.ctx().set_caching(buf.handle, CachingMode::Snooped)?;
        Ok(buf)
    }

    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
        cpu_set(h, buf, val)
    }

    fn cmp(&self, h: &Harness, buf: &TestBuffer, _snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
        cpu_cmp(h, buf, val)
    }
}

/// Buffers imported from user memory, accessed through the import
struct UserPtr;

impl AccessStrategy for UserPtr {
    fn name(&self) -> &'static str {
        "userptr"
    }

    fn check(&self, caps: &DeviceCaps, kind: MemKind) -> Option<String> {
        if !caps.supports_userptr {
            return Some("device cannot import user memory".to_string());
        }
        (kind != MemKind::Normal).then(|| "imported memory is always ordinary".to_string())
    }

    fn create(&self, h: &Harness, _kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
        let handle = h.ctx().create_imported(geometry.size_bytes())?;
        let map = h.ctx().map(handle, MapKind::Direct)?;
        Ok(TestBuffer {
            handle,
            width: geometry.width,
            height: geometry.height,
            tiling: Tiling::None,
            map: Some(map),
        })
    }

    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
        let map = buf
            .map
            .as_ref()
            .ok_or_else(|| wringer_device::DeviceError::unsupported("imported buffer lost its mapping"))?;
        h.ctx().set_domain(buf.handle, Domain::Cpu, Some(Domain::Cpu))?;
        let words = vec![val; buf.npixels()];
        map.write(0, bytemuck::cast_slice(&words))?;
        Ok(())
    }

    fn cmp(&self, h: &Harness, buf: &TestBuffer, _snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
        let map = buf
            .map
            .as_ref()
            .ok_or_else(|| wringer_device::DeviceError::unsupported("imported buffer lost its mapping"))?;
        h.ctx().set_domain(buf.handle, Domain::Cpu, None)?;
        let mut words = vec![0u32; buf.npixels()];
        map.read(0, bytemuck::cast_slice_mut(&mut words))?;
        cmp_words(&words, val)
    }
}

/// Persistent direct (aperture) mappings, linear layout
struct DirectMap;

impl AccessStrategy for DirectMap {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn check(&self, _caps: &DeviceCaps, _kind: MemKind) -> Option<String> {
        None
    }

    fn create(&self, h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
        let mut buf = plain_buffer(h, kind, geometry)?;
        buf.map = Some(h.ctx().map(buf.handle, MapKind::Direct)?);
        Ok(buf)
    }

    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
        mapped_set(h, buf, val)
    }

    fn cmp(&self, h: &Harness, buf: &TestBuffer, _snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
        mapped_cmp_sampled(h, buf, val)
    }
}

/// Persistent direct mappings over an X-tiled layout
struct DirectMapTiled;

impl AccessStrategy for DirectMapTiled {
    fn name(&self) -> &'static str {
        "directx"
    }

    fn check(&self, caps: &DeviceCaps, _kind: MemKind) -> Option<String> {
        (!caps.swizzle_stable).then(|| "unstable swizzling breaks host access to tiled buffers".to_string())
    }

    fn create(&self, h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
        let mut buf = plain_buffer(h, kind, geometry)?;
        h.ctx().set_tiling(buf.handle, Tiling::X, (geometry.width * 4) as u32)?;
        buf.tiling = Tiling::X;
        buf.map = Some(h.ctx().map(buf.handle, MapKind::Direct)?);
        Ok(buf)
    }

    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
        mapped_set(h, buf, val)
    }

    fn cmp(&self, h: &Harness, buf: &TestBuffer, _snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
        mapped_cmp_sampled(h, buf, val)
    }
}

/// Persistent write-combined mappings
struct WcMap;

impl AccessStrategy for WcMap {
    fn name(&self) -> &'static str {
        "wc"
    }

    fn check(&self, caps: &DeviceCaps, kind: MemKind) -> Option<String> {
        if !caps.supports_wc_map {
            return Some("device has no write-combined mapping support".to_string());
        }
        (!kind.cpu_accessible()).then(|| "stolen memory cannot be mapped write-combined".to_string())
    }

    fn create(&self, h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
        let mut buf = plain_buffer(h, kind, geometry)?;
        buf.map = Some(h.ctx().map(buf.handle, MapKind::WriteCombined)?);
        Ok(buf)
    }

    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
        mapped_set(h, buf, val)
    }

    fn cmp(&self, h: &Harness, buf: &TestBuffer, _snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
        mapped_cmp_full(h, buf, val)
    }
}

// ================================================================================================
// Device-side strategies
// ================================================================================================

/// Set via a blit fill; compare via a blit to the snooped readback
/// buffer and a host check there
struct GpuFill;

fn gpu_set(h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
    let tiled = buf.tiling == Tiling::X;
    let params = FillParams {
        row_bytes: (buf.width * 4) as u32,
        rows: buf.height as u32,
        stride: if tiled { buf.width as u32 } else { (buf.width * 4) as u32 },
        tiled,
    };
    Ok(h.ctx().submit_fill(Queue::Blt, buf.handle, val, &params)?)
}

fn gpu_cmp(h: &Harness, buf: &TestBuffer, snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
    let snoop = snoop.ok_or_else(|| wringer_device::DeviceError::unsupported("no readback buffer in set"))?;
    let src_tiled = buf.tiling == Tiling::X;
    let params = CopyParams {
        row_bytes: (buf.width * 4) as u32,
        rows: buf.height as u32,
        dst_stride: (snoop.width * 4) as u32,
        src_stride: if src_tiled { buf.width as u32 } else { (buf.width * 4) as u32 },
        dst_tiled: false,
        src_tiled,
    };
    h.ctx().submit_copy(Queue::Blt, snoop.handle, buf.handle, &params)?;
    cpu_cmp(h, snoop, val)
}

impl AccessStrategy for GpuFill {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn check(&self, caps: &DeviceCaps, _kind: MemKind) -> Option<String> {
        (!caps.has_blt).then(|| "device has no blit queue".to_string())
    }

    fn needs_snoop(&self) -> bool {
        true
    }

    fn create(&self, h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
        plain_buffer(h, kind, geometry)
    }

    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
        gpu_set(h, buf, val)
    }

    fn cmp(&self, h: &Harness, buf: &TestBuffer, snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
        gpu_cmp(h, buf, snoop, val)
    }
}

/// [`GpuFill`] over an X-tiled layout
struct GpuFillTiled;

impl AccessStrategy for GpuFillTiled {
    fn name(&self) -> &'static str {
        "gpux"
    }

    fn check(&self, caps: &DeviceCaps, _kind: MemKind) -> Option<String> {
        (!caps.has_blt).then(|| "device has no blit queue".to_string())
    }

    fn needs_snoop(&self) -> bool {
        true
    }

    fn create(&self, h: &Harness, kind: MemKind, geometry: Geometry) -> Result<TestBuffer> {
        let mut buf = plain_buffer(h, kind, geometry)?;
        h.ctx().set_tiling(buf.handle, Tiling::X, (geometry.width * 4) as u32)?;
        buf.tiling = Tiling::X;
        Ok(buf)
    }

    fn set(&self, h: &Harness, buf: &TestBuffer, val: u32) -> Result<()> {
        gpu_set(h, buf, val)
    }

    fn cmp(&self, h: &Harness, buf: &TestBuffer, snoop: Option<&TestBuffer>, val: u32) -> Result<()> {
        gpu_cmp(h, buf, snoop, val)
    }
}
