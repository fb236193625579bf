//! Device trait surface
//!
//! These traits are the narrow interface the verification harness
//! drives. A device exposes independent contexts; each context sees
//! the same buffers (handles are device-global) but owns its own
//! connection-scoped state, which is what the forked concurrency
//! wrappers rely on.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Device                           │
//! │  open() ─────────► DeviceContext (one per executor)  │
//! └──────────────────────┬───────────────────────────────┘
//!                        │
//!        ┌───────────────┼──────────────────┐
//!        ▼               ▼                  ▼
//!   buffers          submission        diagnostics
//!   create/map/      copy/fill/spin    error_state /
//!   set_domain       on blt & render   missed_irq
//! ```

use std::sync::Arc;

use super::types::{
    BufferHandle, CachingMode, CopyParams, DeviceCaps, DiagEntry, Domain, FillParams, MapKind, MemKind, Queue,
    SpinTicket, Tiling,
};
use crate::error::Result;

/// A device that can hand out independent execution contexts
pub trait Device: Send + Sync {
    /// Open a new context. Each context is an independent connection:
    /// it shares buffers with every other context but has its own
    /// interruption state and its own lifetime.
    fn open(&self) -> Result<Box<dyn DeviceContext>>;
}

/// One connection to a device
///
/// All methods take `&self`; implementations synchronize internally.
/// Command submission (`submit_*`) returns after enqueue, not after
/// completion — an explicit synchronization point (`set_domain`,
/// `pread`/`pwrite`, `wait_buffer`, `quiesce`, `wait_recovered`)
/// forces a wait.
pub trait DeviceContext: Send + Sync {
    /// Capability report for the underlying device
    fn caps(&self) -> DeviceCaps;

    // ============================================================================================
    // Buffer primitives
    // ============================================================================================

    /// Allocate a buffer of `size` bytes from the given memory kind
    fn create(&self, kind: MemKind, size: usize) -> Result<BufferHandle>;

    /// Import externally-owned (user) memory of `size` bytes as a
    /// buffer. The memory stays owned by the importer; mappings over
    /// the buffer observe it directly.
    fn create_imported(&self, size: usize) -> Result<BufferHandle>;

    /// Release a buffer handle. Fails if mappings are still live.
    fn close_buffer(&self, handle: BufferHandle) -> Result<()>;

    /// Buffer size in bytes
    fn buffer_size(&self, handle: BufferHandle) -> Result<usize>;

    /// Device (aperture) address of the buffer
    fn device_addr(&self, handle: BufferHandle) -> Result<u64>;

    /// Synchronized host write: waits for outstanding device work on
    /// the buffer, then copies `data` into it at `offset`
    fn pwrite(&self, handle: BufferHandle, offset: usize, data: &[u8]) -> Result<()>;

    /// Synchronized host read: waits for outstanding device work on
    /// the buffer, then copies out of it at `offset`
    fn pread(&self, handle: BufferHandle, offset: usize, out: &mut [u8]) -> Result<()>;

    /// Map the buffer for host access through the given visibility
    /// regime. Cached mappings synchronize on creation and flush on
    /// drop; direct and write-combined mappings do neither — callers
    /// must bracket access with [`Self::set_domain`].
    fn map(&self, handle: BufferHandle, kind: MapKind) -> Result<Mapping>;

    /// Declare a coherency-domain transition for the buffer. Blocks
    /// until outstanding device work on the buffer completes, then
    /// makes the named domain's view coherent. `write` marks the
    /// domain that will modify the contents next.
    fn set_domain(&self, handle: BufferHandle, read: Domain, write: Option<Domain>) -> Result<()>;

    /// Change the buffer's memory layout
    fn set_tiling(&self, handle: BufferHandle, tiling: Tiling, stride: u32) -> Result<()>;

    /// Change the buffer's caching mode
    fn set_caching(&self, handle: BufferHandle, mode: CachingMode) -> Result<()>;

    // ============================================================================================
    // Command submission
    // ============================================================================================

    /// Enqueue a 2D copy on the named queue. Returns after enqueue.
    fn submit_copy(&self, queue: Queue, dst: BufferHandle, src: BufferHandle, params: &CopyParams) -> Result<()>;

    /// Enqueue a 2D solid fill on the named queue. Returns after
    /// enqueue.
    fn submit_fill(&self, queue: Queue, dst: BufferHandle, value: u32, params: &FillParams) -> Result<()>;

    /// Enqueue a deliberately endless batch so the fault-detection
    /// timer fires and forces a recovery cycle. With `capture`, the
    /// driver snapshots a crash record before resetting.
    ///
    /// The returned ticket keeps the batch buffer alive; callers
    /// consume it with [`Self::wait_recovered`] and close the batch.
    fn submit_spin(&self, queue: Queue, capture: bool) -> Result<SpinTicket>;

    // ============================================================================================
    // Synchronization
    // ============================================================================================

    /// Block until all outstanding device work on the buffer completes
    fn wait_buffer(&self, handle: BufferHandle) -> Result<()>;

    /// Block until the spin batch has been detected, the queue reset,
    /// and the queue returned to an operable state
    fn wait_recovered(&self, ticket: &SpinTicket) -> Result<()>;

    /// Block until every queue is idle
    fn quiesce(&self) -> Result<()>;

    // ============================================================================================
    // Diagnostics (filesystem-like)
    // ============================================================================================

    /// Read a diagnostics entry as text
    fn diag_read(&self, entry: DiagEntry) -> Result<String>;

    /// Write to a diagnostics entry (clears counters / error state,
    /// or triggers a queue stop)
    fn diag_write(&self, entry: DiagEntry, data: &[u8]) -> Result<()>;

    // ============================================================================================
    // Interruption source
    // ============================================================================================

    /// Arm or disarm the asynchronous interruption source for this
    /// context. While armed, blocking waits wake early at arbitrary
    /// points and restart transparently; results are unaffected.
    fn set_interrupt_storm(&self, armed: bool);
}

/// Backing access for a [`Mapping`]
pub trait MapAccess: Send + Sync {
    /// Write `data` at byte `offset`
    fn write(&self, offset: usize, data: &[u8]) -> Result<()>;

    /// Read into `out` from byte `offset`
    fn read(&self, offset: usize, out: &mut [u8]) -> Result<()>;

    /// Mapped length in bytes
    fn len(&self) -> usize;
}

/// Host mapping of a device buffer
///
/// Cloneable; the underlying mapping is released (and, for cached
/// mappings, flushed) when the last clone drops.
#[derive(Clone)]
pub struct Mapping {
    kind: MapKind,
    inner: Arc<dyn MapAccess>,
}

impl Mapping {
    /// Wrap a backing implementation
    pub fn new(kind: MapKind, inner: Arc<dyn MapAccess>) -> Self {
        Self { kind, inner }
    }

    /// Visibility regime of this mapping
    pub fn kind(&self) -> MapKind {
        self.kind
    }

    /// Mapped length in bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the mapping covers zero bytes
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Write raw bytes at `offset`
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.inner.write(offset, data)
    }

    /// Read raw bytes at `offset`
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        self.inner.read(offset, out)
    }

    /// Write one 32-bit element at element index `index`
    pub fn write_u32(&self, index: usize, value: u32) -> Result<()> {
        self.inner.write(index * 4, &value.to_le_bytes())
    }

    /// Read one 32-bit element at element index `index`
    pub fn read_u32(&self, index: usize) -> Result<u32> {
        let mut word = [0u8; 4];
        self.inner.read(index * 4, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("kind", &self.kind)
            .field("len", &self.inner.len())
            .finish()
    }
}
