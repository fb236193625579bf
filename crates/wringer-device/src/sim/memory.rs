//! Buffer table for the simulated device
//!
//! Every buffer is a plain byte vector plus the coherency state the
//! harness is supposed to manage: a CPU-cache shadow for cached
//! mappings, a pending-work count for outstanding queue commands, and
//! the layout/caching attributes set through the context.

use std::collections::HashMap;

use crate::device::types::{BufferHandle, CachingMode, MemKind, Queue, Tiling};
use crate::error::{DeviceError, Result};

/// Base of the simulated aperture; buffer addresses grow upward
const APERTURE_BASE: u64 = 0x0010_0000;

/// One simulated buffer
pub(crate) struct SimBuffer {
    /// Device memory (ground truth)
    pub store: Vec<u8>,
    pub kind: MemKind,
    pub tiling: Tiling,
    pub stride: u32,
    pub caching: CachingMode,
    /// Device (aperture) address
    pub addr: u64,
    /// Outstanding queue commands referencing this buffer
    pub pending: usize,
    /// Queue of the most recent submission touching this buffer
    pub last_queue: Option<Queue>,
    /// CPU-cache shadow, live while cached mappings exist
    pub shadow: Option<Vec<u8>>,
    pub shadow_dirty: bool,
    /// Live host mappings of any kind
    pub map_count: usize,
    /// Backing memory is user-owned (imported)
    pub imported: bool,
}

impl SimBuffer {
    /// Flush a dirty CPU shadow back to device memory
    pub fn flush_shadow(&mut self) {
        if self.shadow_dirty {
            if let Some(shadow) = &self.shadow {
                self.store.copy_from_slice(shadow);
            }
            self.shadow_dirty = false;
        }
    }

    /// Refresh the CPU shadow from device memory, discarding stale
    /// cached data
    pub fn invalidate_shadow(&mut self) {
        if let Some(shadow) = &mut self.shadow {
            shadow.copy_from_slice(&self.store);
        }
        self.shadow_dirty = false;
    }
}

/// Handle-indexed buffer table with a bump allocator for handles and
/// aperture addresses
pub(crate) struct BufferTable {
    map: HashMap<u64, SimBuffer>,
    next_id: u64,
    next_addr: u64,
    /// Bytes currently allocated, checked against the RAM budget
    pub allocated: u64,
}

impl BufferTable {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            next_id: 1,
            next_addr: APERTURE_BASE,
            allocated: 0,
        }
    }

    pub fn insert(&mut self, kind: MemKind, size: usize, imported: bool) -> BufferHandle {
        let id = self.next_id;
        self.next_id += 1;

        let addr = self.next_addr;
        // 4 KiB-aligned aperture placement
        self.next_addr += (size as u64 + 0xfff) & !0xfff;
        self.allocated += size as u64;

        self.map.insert(
            id,
            SimBuffer {
                store: vec![0u8; size],
                kind,
                tiling: Tiling::None,
                stride: 0,
                caching: CachingMode::None,
                addr,
                pending: 0,
                last_queue: None,
                shadow: None,
                shadow_dirty: false,
                map_count: 0,
                imported,
            },
        );
        BufferHandle::new(id)
    }

    pub fn remove(&mut self, handle: BufferHandle) -> Result<()> {
        let buf = self.get(handle)?;
        if buf.map_count > 0 {
            return Err(DeviceError::MappingsOutstanding {
                handle,
                mappings: buf.map_count,
            });
        }
        if let Some(buf) = self.map.remove(&handle.id()) {
            self.allocated = self.allocated.saturating_sub(buf.store.len() as u64);
        }
        Ok(())
    }

    pub fn get(&self, handle: BufferHandle) -> Result<&SimBuffer> {
        self.map
            .get(&handle.id())
            .ok_or(DeviceError::InvalidHandle(handle.id()))
    }

    pub fn get_mut(&mut self, handle: BufferHandle) -> Result<&mut SimBuffer> {
        self.map
            .get_mut(&handle.id())
            .ok_or(DeviceError::InvalidHandle(handle.id()))
    }

    /// Bounds-checked read of device memory
    pub fn read_store(&self, handle: BufferHandle, offset: usize, out: &mut [u8]) -> Result<()> {
        let buf = self.get(handle)?;
        check_bounds(offset, out.len(), buf.store.len())?;
        out.copy_from_slice(&buf.store[offset..offset + out.len()]);
        Ok(())
    }

    /// Bounds-checked write of device memory
    pub fn write_store(&mut self, handle: BufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        let buf = self.get_mut(handle)?;
        check_bounds(offset, data.len(), buf.store.len())?;
        buf.store[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

pub(crate) fn check_bounds(offset: usize, size: usize, buffer_size: usize) -> Result<()> {
    if offset
        .checked_add(size)
        .map_or(true, |end| end > buffer_size)
    {
        return Err(DeviceError::OutOfBounds {
            offset,
            size,
            buffer_size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut table = BufferTable::new();
        let handle = table.insert(MemKind::Normal, 4096, false);

        assert_eq!(table.get(handle).unwrap().store.len(), 4096);
        assert_eq!(table.allocated, 4096);

        table.remove(handle).unwrap();
        assert!(table.get(handle).is_err());
        assert_eq!(table.allocated, 0);
    }

    #[test]
    fn test_addresses_are_aligned_and_distinct() {
        let mut table = BufferTable::new();
        let a = table.insert(MemKind::Normal, 100, false);
        let b = table.insert(MemKind::Normal, 100, false);

        let addr_a = table.get(a).unwrap().addr;
        let addr_b = table.get(b).unwrap().addr;
        assert_eq!(addr_a % 4096, 0);
        assert_eq!(addr_b % 4096, 0);
        assert_ne!(addr_a, addr_b);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut table = BufferTable::new();
        let handle = table.insert(MemKind::Normal, 16, false);

        let mut out = [0u8; 8];
        assert!(table.read_store(handle, 12, &mut out).is_err());
        assert!(table.write_store(handle, 16, &[1]).is_err());
        assert!(table.read_store(handle, 8, &mut out).is_ok());
    }

    #[test]
    fn test_remove_with_live_mapping_fails() {
        let mut table = BufferTable::new();
        let handle = table.insert(MemKind::Normal, 16, false);
        table.get_mut(handle).unwrap().map_count = 1;

        assert!(matches!(
            table.remove(handle),
            Err(DeviceError::MappingsOutstanding { .. })
        ));

        table.get_mut(handle).unwrap().map_count = 0;
        table.remove(handle).unwrap();
    }

    #[test]
    fn test_shadow_flush_and_invalidate() {
        let mut table = BufferTable::new();
        let handle = table.insert(MemKind::Normal, 4, false);

        let buf = table.get_mut(handle).unwrap();
        buf.shadow = Some(vec![7u8; 4]);
        buf.shadow_dirty = true;
        buf.flush_shadow();
        assert_eq!(buf.store, vec![7u8; 4]);
        assert!(!buf.shadow_dirty);

        buf.store.copy_from_slice(&[9u8; 4]);
        buf.invalidate_shadow();
        assert_eq!(buf.shadow.as_deref(), Some(&[9u8; 4][..]));
    }
}
