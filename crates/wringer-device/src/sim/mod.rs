//! Software-simulated device
//!
//! A full in-process implementation of the [`Device`] traits, accurate
//! enough that the verification harness exercises the same coherency
//! and recovery protocol it would against hardware:
//!
//! - Buffers are byte vectors (device memory ground truth). Cached
//!   mappings go through a per-buffer shadow that only meets device
//!   memory at domain transitions, so a missing `set_domain` call
//!   really does read stale data.
//! - Each queue is drained by a worker thread with a small submission
//!   latency. Spin batches stall the queue until a fault timer fires,
//!   then capture a crash record and reset, like the real recovery
//!   path.
//! - Capabilities come from [`SimConfig`], so matrix skip paths
//!   (no LLC, no userptr, tiny apertures, command parser present) are
//!   all reachable in tests.

mod diagnostics;
mod memory;
mod queues;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::device::traits::{Device, DeviceContext, MapAccess, Mapping};
use crate::device::types::{
    BufferHandle, CachingMode, CopyParams, DeviceCaps, DiagEntry, Domain, FillParams, MapKind, MemKind, Queue,
    SpinTicket, Tiling,
};
use crate::error::{DeviceError, Result};

use diagnostics::Diagnostics;
use memory::{check_bounds, BufferTable};
use queues::{worker_loop, Command, QueueShared};

pub(crate) use queues::{BATCH_WORDS, CMD_LOOP};

/// Poll interval for blocking waits while the interrupt storm is armed
const STORM_POLL: Duration = Duration::from_micros(50);

/// Configuration for a [`SimDevice`]
///
/// `caps` is reported verbatim through [`DeviceContext::caps`] and
/// also enforced (unsupported memory kinds and mapping regimes are
/// rejected, allocations are charged against `avail_ram`).
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Capability report, enforced by the simulation
    pub caps: DeviceCaps,
    /// Fault-injection hook: count every completion as a missed
    /// notification
    pub drop_notifications: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            caps: DeviceCaps {
                generation: 8,
                llc: true,
                has_blt: true,
                has_render: true,
                supports_userptr: true,
                supports_wc_map: true,
                supports_private: false,
                supports_stolen: false,
                swizzle_stable: true,
                cmd_parser_version: 0,
                ppgtt: true,
                mappable_aperture: 8 << 20,
                total_aperture: 16 << 20,
                avail_ram: 256 << 20,
                avail_swap: 0,
            },
            drop_notifications: false,
        }
    }
}

impl SimConfig {
    /// Capability report this configuration will produce
    pub fn caps(&self) -> DeviceCaps {
        self.caps
    }

    /// A device without a shared last-level cache; snooped caching
    /// becomes meaningful
    pub fn without_llc() -> Self {
        let mut config = Self::default();
        config.caps.llc = false;
        config
    }

    /// A generation-7 device with an active command parser, which
    /// rewrites batch addresses before execution
    pub fn with_command_parser() -> Self {
        let mut config = Self::default();
        config.caps.generation = 7;
        config.caps.cmd_parser_version = 9;
        config
    }

    /// A device that loses every completion notification
    pub fn dropping_notifications() -> Self {
        let mut config = Self::default();
        config.drop_notifications = true;
        config
    }
}

/// Shared state behind every context and worker
pub(crate) struct SimState {
    pub config: SimConfig,
    pub buffers: Mutex<BufferTable>,
    /// Signalled whenever pending-work counts drop
    pub buffers_cv: Condvar,
    pub queues: [QueueShared; 2],
    pub diag: Diagnostics,
    pub shutdown: AtomicBool,
}

impl SimState {
    /// Drop one pending-work reference from each handle and wake
    /// waiters. Called by workers after a command completes.
    pub fn retire_buffers(&self, handles: &[BufferHandle]) {
        let mut table = self.buffers.lock();
        for &handle in handles {
            if let Ok(buf) = table.get_mut(handle) {
                buf.pending = buf.pending.saturating_sub(1);
            }
        }
        self.buffers_cv.notify_all();
    }

    /// Snapshot a batch buffer as 32-bit words for crash capture
    pub fn read_batch_words(&self, batch: BufferHandle) -> Vec<u32> {
        let table = self.buffers.lock();
        match table.get(batch) {
            Ok(buf) => buf
                .store
                .chunks_exact(4)
                .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
            Err(_) => vec![0; BATCH_WORDS],
        }
    }
}

/// In-process simulated device
///
/// Spawns one worker thread per queue on construction; workers are
/// joined on drop.
pub struct SimDevice {
    state: Arc<SimState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SimDevice {
    pub fn new(config: SimConfig) -> Self {
        let state = Arc::new(SimState {
            config,
            buffers: Mutex::new(BufferTable::new()),
            buffers_cv: Condvar::new(),
            queues: [QueueShared::new(Queue::Blt), QueueShared::new(Queue::Render)],
            diag: Diagnostics::new(),
            shutdown: AtomicBool::new(false),
        });

        let workers = Queue::ALL
            .into_iter()
            .map(|queue| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || worker_loop(state, queue))
            })
            .collect();

        tracing::debug!(?config, "simulated device up");
        Self {
            state,
            workers: Mutex::new(workers),
        }
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl Device for SimDevice {
    fn open(&self) -> Result<Box<dyn DeviceContext>> {
        Ok(Box::new(SimContext {
            state: Arc::clone(&self.state),
            storm: AtomicBool::new(false),
        }))
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.state.shutdown.store(true, Ordering::SeqCst);
        for shared in &self.state.queues {
            shared.cv.notify_all();
        }
        for worker in self.workers.lock().drain(..) {
            let _ = worker.join();
        }
    }
}

/// One connection to a [`SimDevice`]
pub struct SimContext {
    state: Arc<SimState>,
    storm: AtomicBool,
}

impl SimContext {
    fn check_queue(&self, queue: Queue) -> Result<()> {
        if !self.state.config.caps.has_queue(queue) {
            return Err(DeviceError::QueueUnavailable(queue));
        }
        Ok(())
    }

    /// Block until no queue command references the buffer. While the
    /// interrupt storm is armed the wait wakes early at the poll
    /// interval and restarts.
    fn wait_buffer_idle(&self, handle: BufferHandle) -> Result<()> {
        let mut table = self.state.buffers.lock();
        loop {
            if table.get(handle)?.pending == 0 {
                return Ok(());
            }
            if self.storm.load(Ordering::Relaxed) {
                self.state.buffers_cv.wait_for(&mut table, STORM_POLL);
            } else {
                self.state.buffers_cv.wait(&mut table);
            }
        }
    }

    fn enqueue(&self, queue: Queue, cmd: Command) {
        let shared = &self.state.queues[queue.index()];
        shared.inner.lock().pending.push_back(cmd);
        shared.cv.notify_one();
    }

    /// Take a pending-work reference on each handle for a submission
    /// to `queue`. Queues are independent ordering domains, so a
    /// buffer still in flight on a different queue stalls the
    /// submission until it retires, like a driver-inserted semaphore.
    /// CPU-cache shadows are flushed so the queue reads current data.
    fn claim_for_queue(&self, queue: Queue, handles: &[BufferHandle]) -> Result<()> {
        let mut table = self.state.buffers.lock();
        loop {
            let mut conflict = false;
            for &handle in handles {
                let buf = table.get(handle)?;
                if buf.pending > 0 && buf.last_queue.is_some_and(|q| q != queue) {
                    conflict = true;
                    break;
                }
            }
            if !conflict {
                for &handle in handles {
                    let buf = table.get_mut(handle)?;
                    buf.flush_shadow();
                    buf.pending += 1;
                    buf.last_queue = Some(queue);
                }
                return Ok(());
            }
            if self.storm.load(Ordering::Relaxed) {
                self.state.buffers_cv.wait_for(&mut table, STORM_POLL);
            } else {
                self.state.buffers_cv.wait(&mut table);
            }
        }
    }
}

impl DeviceContext for SimContext {
    fn caps(&self) -> DeviceCaps {
        self.state.config.caps()
    }

    fn create(&self, kind: MemKind, size: usize) -> Result<BufferHandle> {
        match kind {
            MemKind::Private if !self.state.config.caps.supports_private => {
                return Err(DeviceError::unsupported("private memory creation"));
            }
            MemKind::Stolen if !self.state.config.caps.supports_stolen => {
                return Err(DeviceError::unsupported("stolen memory creation"));
            }
            _ => {}
        }

        let mut table = self.state.buffers.lock();
        let available = self.state.config.caps.avail_ram.saturating_sub(table.allocated);
        if size as u64 > available {
            return Err(DeviceError::OutOfMemory {
                requested: size as u64,
                available,
            });
        }
        Ok(table.insert(kind, size, false))
    }

    fn create_imported(&self, size: usize) -> Result<BufferHandle> {
        if !self.state.config.caps.supports_userptr {
            return Err(DeviceError::unsupported("importing user memory"));
        }
        let mut table = self.state.buffers.lock();
        let available = self.state.config.caps.avail_ram.saturating_sub(table.allocated);
        if size as u64 > available {
            return Err(DeviceError::OutOfMemory {
                requested: size as u64,
                available,
            });
        }
        Ok(table.insert(MemKind::Normal, size, true))
    }

    fn close_buffer(&self, handle: BufferHandle) -> Result<()> {
        self.wait_buffer_idle(handle)?;
        self.state.buffers.lock().remove(handle)
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        Ok(self.state.buffers.lock().get(handle)?.store.len())
    }

    fn device_addr(&self, handle: BufferHandle) -> Result<u64> {
        Ok(self.state.buffers.lock().get(handle)?.addr)
    }

    fn pwrite(&self, handle: BufferHandle, offset: usize, data: &[u8]) -> Result<()> {
        self.wait_buffer_idle(handle)?;
        let mut table = self.state.buffers.lock();
        let buf = table.get_mut(handle)?;
        buf.flush_shadow();
        check_bounds(offset, data.len(), buf.store.len())?;
        buf.store[offset..offset + data.len()].copy_from_slice(data);
        buf.invalidate_shadow();
        Ok(())
    }

    fn pread(&self, handle: BufferHandle, offset: usize, out: &mut [u8]) -> Result<()> {
        self.wait_buffer_idle(handle)?;
        let mut table = self.state.buffers.lock();
        let buf = table.get_mut(handle)?;
        buf.flush_shadow();
        check_bounds(offset, out.len(), buf.store.len())?;
        out.copy_from_slice(&buf.store[offset..offset + out.len()]);
        Ok(())
    }

    fn map(&self, handle: BufferHandle, kind: MapKind) -> Result<Mapping> {
        if kind == MapKind::WriteCombined && !self.state.config.caps.supports_wc_map {
            return Err(DeviceError::unsupported("write-combined mapping"));
        }
        if kind == MapKind::Cached {
            self.wait_buffer_idle(handle)?;
        }

        let mut table = self.state.buffers.lock();
        let buf = table.get_mut(handle)?;
        if !buf.kind.cpu_accessible() {
            return Err(DeviceError::unsupported("mapping stolen memory"));
        }

        if kind == MapKind::Cached && buf.shadow.is_none() {
            buf.shadow = Some(buf.store.clone());
        }
        buf.map_count += 1;
        let len = buf.store.len();
        let state = Arc::clone(&self.state);

        let inner: Arc<dyn MapAccess> = match kind {
            MapKind::Cached => Arc::new(CachedMap { state, handle, len }),
            MapKind::Direct | MapKind::WriteCombined => Arc::new(DirectMap { state, handle, len }),
        };
        Ok(Mapping::new(kind, inner))
    }

    fn set_domain(&self, handle: BufferHandle, read: Domain, _write: Option<Domain>) -> Result<()> {
        self.wait_buffer_idle(handle)?;
        let mut table = self.state.buffers.lock();
        let buf = table.get_mut(handle)?;
        buf.flush_shadow();
        if read == Domain::Cpu {
            buf.invalidate_shadow();
        }
        Ok(())
    }

    fn set_tiling(&self, handle: BufferHandle, tiling: Tiling, stride: u32) -> Result<()> {
        let mut table = self.state.buffers.lock();
        let buf = table.get_mut(handle)?;
        buf.tiling = tiling;
        buf.stride = stride;
        Ok(())
    }

    fn set_caching(&self, handle: BufferHandle, mode: CachingMode) -> Result<()> {
        let mut table = self.state.buffers.lock();
        let buf = table.get_mut(handle)?;
        if buf.imported {
            return Err(DeviceError::unsupported("changing caching of imported memory"));
        }
        buf.caching = mode;
        Ok(())
    }

    fn submit_copy(&self, queue: Queue, dst: BufferHandle, src: BufferHandle, params: &CopyParams) -> Result<()> {
        self.check_queue(queue)?;
        self.claim_for_queue(queue, &[dst, src])?;
        self.enqueue(
            queue,
            Command::Copy {
                dst,
                src,
                params: *params,
            },
        );
        Ok(())
    }

    fn submit_fill(&self, queue: Queue, dst: BufferHandle, value: u32, params: &FillParams) -> Result<()> {
        self.check_queue(queue)?;
        self.claim_for_queue(queue, &[dst])?;
        self.enqueue(
            queue,
            Command::Fill {
                dst,
                value,
                params: *params,
            },
        );
        Ok(())
    }

    fn submit_spin(&self, queue: Queue, capture: bool) -> Result<SpinTicket> {
        self.check_queue(queue)?;

        let batch = self.create(MemKind::Normal, BATCH_WORDS * 4)?;
        let addr = self.device_addr(batch)?;
        self.pwrite(batch, 0, &CMD_LOOP.to_le_bytes())?;
        self.pwrite(batch, 4, &(addr as u32).to_le_bytes())?;
        self.pwrite(batch, 8, &((addr >> 32) as u32).to_le_bytes())?;

        self.claim_for_queue(queue, &[batch])?;

        let shared = &self.state.queues[queue.index()];
        let seqno = {
            let mut inner = shared.inner.lock();
            inner.spin_seqno += 1;
            let seqno = inner.spin_seqno;
            inner.pending.push_back(Command::Spin {
                batch,
                addr,
                capture,
                seqno,
            });
            seqno
        };
        shared.cv.notify_one();

        tracing::debug!(%queue, %batch, addr, capture, seqno, "spin batch submitted");
        Ok(SpinTicket {
            queue,
            batch,
            addr,
            capture,
            seqno,
        })
    }

    fn wait_buffer(&self, handle: BufferHandle) -> Result<()> {
        self.wait_buffer_idle(handle)
    }

    fn wait_recovered(&self, ticket: &SpinTicket) -> Result<()> {
        let shared = &self.state.queues[ticket.queue.index()];
        let mut inner = shared.inner.lock();
        while inner.recovered_seqno < ticket.seqno {
            if self.storm.load(Ordering::Relaxed) {
                shared.cv.wait_for(&mut inner, STORM_POLL);
            } else {
                shared.cv.wait(&mut inner);
            }
        }
        Ok(())
    }

    fn quiesce(&self) -> Result<()> {
        for queue in Queue::ALL {
            let shared = &self.state.queues[queue.index()];
            let mut inner = shared.inner.lock();
            while !inner.pending.is_empty() || inner.busy {
                if self.storm.load(Ordering::Relaxed) {
                    shared.cv.wait_for(&mut inner, STORM_POLL);
                } else {
                    shared.cv.wait(&mut inner);
                }
            }
        }
        Ok(())
    }

    fn diag_read(&self, entry: DiagEntry) -> Result<String> {
        match entry {
            DiagEntry::ErrorState => Ok(self.state.diag.read_error_state()),
            DiagEntry::MissedIrq => Ok(self.state.diag.missed_irq_count().to_string()),
            DiagEntry::QueueStop => Ok("0x00000000".to_string()),
        }
    }

    fn diag_write(&self, entry: DiagEntry, data: &[u8]) -> Result<()> {
        match entry {
            DiagEntry::ErrorState => {
                self.state.diag.clear_error_state();
                Ok(())
            }
            DiagEntry::MissedIrq => {
                self.state.diag.clear_missed_irqs();
                Ok(())
            }
            DiagEntry::QueueStop => {
                let text = std::str::from_utf8(data).map_err(|_| DeviceError::BadDiagInput {
                    entry: entry.name().to_string(),
                    reason: "not valid UTF-8".to_string(),
                })?;
                let queue = match text.trim() {
                    "blt" => Queue::Blt,
                    "render" => Queue::Render,
                    other => {
                        return Err(DeviceError::BadDiagInput {
                            entry: entry.name().to_string(),
                            reason: format!("unknown queue {other:?}"),
                        });
                    }
                };
                // Synchronous stop cycle: fault the queue, wait for
                // recovery, release the batch.
                let ticket = self.submit_spin(queue, true)?;
                self.wait_recovered(&ticket)?;
                self.close_buffer(ticket.batch)
            }
        }
    }

    fn set_interrupt_storm(&self, armed: bool) {
        self.storm.store(armed, Ordering::Relaxed);
    }
}

/// CPU-cached mapping: all access goes through the shadow; device
/// memory is only touched at domain transitions and on drop
struct CachedMap {
    state: Arc<SimState>,
    handle: BufferHandle,
    len: usize,
}

impl MapAccess for CachedMap {
    fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut table = self.state.buffers.lock();
        let buf = table.get_mut(self.handle)?;
        let shadow = buf
            .shadow
            .as_mut()
            .ok_or_else(|| DeviceError::unsupported("cached mapping lost its shadow"))?;
        check_bounds(offset, data.len(), shadow.len())?;
        shadow[offset..offset + data.len()].copy_from_slice(data);
        buf.shadow_dirty = true;
        Ok(())
    }

    fn read(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        let table = self.state.buffers.lock();
        let buf = table.get(self.handle)?;
        let shadow = buf
            .shadow
            .as_ref()
            .ok_or_else(|| DeviceError::unsupported("cached mapping lost its shadow"))?;
        check_bounds(offset, out.len(), shadow.len())?;
        out.copy_from_slice(&shadow[offset..offset + out.len()]);
        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for CachedMap {
    fn drop(&mut self) {
        let mut table = self.state.buffers.lock();
        if let Ok(buf) = table.get_mut(self.handle) {
            buf.flush_shadow();
            buf.map_count = buf.map_count.saturating_sub(1);
            if buf.map_count == 0 {
                buf.shadow = None;
            }
        }
    }
}

/// Direct (aperture or write-combined) mapping: reads and writes go
/// straight to device memory, no cache in between
struct DirectMap {
    state: Arc<SimState>,
    handle: BufferHandle,
    len: usize,
}

impl MapAccess for DirectMap {
    fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.state.buffers.lock().write_store(self.handle, offset, data)
    }

    fn read(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        self.state.buffers.lock().read_store(self.handle, offset, out)
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for DirectMap {
    fn drop(&mut self) {
        let mut table = self.state.buffers.lock();
        if let Ok(buf) = table.get_mut(self.handle) {
            buf.map_count = buf.map_count.saturating_sub(1);
        }
    }
}
