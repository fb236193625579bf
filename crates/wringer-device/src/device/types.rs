//! Types for device handles, queues and capability reporting

use std::fmt;

/// Handle to a device-resident buffer
///
/// Buffers are opaque handles owned by the device. All access goes
/// through `DeviceContext` methods or a [`crate::device::Mapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    /// Create a new buffer handle
    pub const fn new(id: u64) -> Self {
        BufferHandle(id)
    }

    /// Get the internal ID
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bo{}", self.0)
    }
}

/// An independent execution pipeline with its own ordering domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    /// Copy/blit queue
    Blt,
    /// Render/compute queue
    Render,
}

impl Queue {
    /// All queues, in submission-priority order
    pub const ALL: [Queue; 2] = [Queue::Blt, Queue::Render];

    /// Short queue name as used in subtest names and crash records
    pub const fn name(self) -> &'static str {
        match self {
            Queue::Blt => "blt",
            Queue::Render => "render",
        }
    }

    /// Dense index for per-queue tables
    pub const fn index(self) -> usize {
        match self {
            Queue::Blt => 0,
            Queue::Render => 1,
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Backing-memory kind for buffer creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemKind {
    /// Ordinary shmem-backed device memory
    Normal,
    /// Private (CPU-inaccessible) device memory
    Private,
    /// Memory carved out of the stolen region
    Stolen,
}

impl MemKind {
    /// Subtest-name prefix for this creation kind
    pub const fn prefix(self) -> &'static str {
        match self {
            MemKind::Normal => "",
            MemKind::Private => "private-",
            MemKind::Stolen => "stolen-",
        }
    }

    /// Whether the CPU may touch buffers of this kind at all
    pub const fn cpu_accessible(self) -> bool {
        !matches!(self, MemKind::Stolen)
    }
}

/// Memory layout of a 2D buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tiling {
    /// Linear rows
    #[default]
    None,
    /// X-tiled layout; strides in copy commands are expressed in
    /// elements rather than bytes
    X,
}

/// Coherency domain for [`super::DeviceContext::set_domain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Host CPU caches
    Cpu,
    /// Device-side access (aperture / execution engines)
    Device,
}

/// Caching mode of a buffer's backing pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachingMode {
    /// Default (uncached from the CPU's point of view)
    #[default]
    None,
    /// Snooped: CPU-cache coherent even without LLC sharing
    Snooped,
}

/// How a [`super::Mapping`] observes buffer contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    /// CPU-cached mapping; coherent only across domain transitions
    Cached,
    /// Direct aperture mapping, bypassing the CPU cache
    Direct,
    /// Write-combined mapping
    WriteCombined,
}

/// Named diagnostics entries (filesystem-like interface)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagEntry {
    /// Structured crash record; write any byte to clear
    ErrorState,
    /// Queue-stop trigger
    QueueStop,
    /// Missed completion-notification counter; write clears
    MissedIrq,
}

impl DiagEntry {
    /// Entry name as exposed to tooling
    pub const fn name(self) -> &'static str {
        match self {
            DiagEntry::ErrorState => "error_state",
            DiagEntry::QueueStop => "queue_stop",
            DiagEntry::MissedIrq => "missed_irq",
        }
    }
}

/// Text returned by the error-state entry when no record is held
pub const NO_ERROR_STATE: &str = "no error state collected";

/// Row-by-row parameters for a copy submission
///
/// `dst_stride`/`src_stride` carry the raw stride field of the command:
/// bytes for linear buffers, elements when the corresponding `*_tiled`
/// flag is set (tiled layouts encode pitch in elements).
#[derive(Debug, Clone, Copy)]
pub struct CopyParams {
    /// Bytes per row actually transferred
    pub row_bytes: u32,
    /// Number of rows
    pub rows: u32,
    /// Destination stride field (see struct docs)
    pub dst_stride: u32,
    /// Source stride field (see struct docs)
    pub src_stride: u32,
    /// Destination uses a tiled layout
    pub dst_tiled: bool,
    /// Source uses a tiled layout
    pub src_tiled: bool,
}

impl CopyParams {
    /// Effective destination stride in bytes
    pub const fn dst_stride_bytes(&self) -> u32 {
        if self.dst_tiled {
            self.dst_stride * 4
        } else {
            self.dst_stride
        }
    }

    /// Effective source stride in bytes
    pub const fn src_stride_bytes(&self) -> u32 {
        if self.src_tiled {
            self.src_stride * 4
        } else {
            self.src_stride
        }
    }
}

/// Parameters for a fill submission
#[derive(Debug, Clone, Copy)]
pub struct FillParams {
    /// Bytes per row actually written
    pub row_bytes: u32,
    /// Number of rows
    pub rows: u32,
    /// Destination stride field; elements when `tiled`, bytes otherwise
    pub stride: u32,
    /// Destination uses a tiled layout
    pub tiled: bool,
}

impl FillParams {
    /// Effective stride in bytes
    pub const fn stride_bytes(&self) -> u32 {
        if self.tiled {
            self.stride * 4
        } else {
            self.stride
        }
    }
}

/// Receipt for an injected spin (hang) batch
///
/// Consumed exactly once by `wait_recovered`; the batch buffer stays
/// alive so its contents can be compared against the crash record.
#[derive(Debug, Clone)]
pub struct SpinTicket {
    /// Queue the spin batch was submitted to
    pub queue: Queue,
    /// Handle of the spin batch buffer
    pub batch: BufferHandle,
    /// Device address of the batch
    pub addr: u64,
    /// Whether a crash record was requested
    pub capture: bool,
    /// Submission sequence number, used to confirm recovery
    pub seqno: u64,
}

/// Static capability report for an opened device
#[derive(Debug, Clone, Copy)]
pub struct DeviceCaps {
    /// Device generation
    pub generation: u32,
    /// CPU and device share a last-level cache
    pub llc: bool,
    /// Blit queue present
    pub has_blt: bool,
    /// Render queue present
    pub has_render: bool,
    /// Buffers may be imported from user memory
    pub supports_userptr: bool,
    /// Write-combined mappings available
    pub supports_wc_map: bool,
    /// Private memory creation supported
    pub supports_private: bool,
    /// Stolen memory creation supported
    pub supports_stolen: bool,
    /// Physical swizzling matches reported swizzling (safe for CPU
    /// access to tiled buffers)
    pub swizzle_stable: bool,
    /// Command parser version; 0 when absent
    pub cmd_parser_version: u32,
    /// Per-process page tables active
    pub ppgtt: bool,
    /// Mappable aperture size in bytes
    pub mappable_aperture: u64,
    /// Total aperture size in bytes
    pub total_aperture: u64,
    /// Available RAM in bytes
    pub avail_ram: u64,
    /// Available swap in bytes
    pub avail_swap: u64,
}

impl DeviceCaps {
    /// True when the command-parsing layer may rewrite batch addresses
    /// before execution, making crash-record address checks
    /// meaningless
    pub const fn rewrites_addresses(&self) -> bool {
        self.cmd_parser_version > 0 && self.ppgtt && self.generation == 7
    }

    /// Queue availability lookup
    pub const fn has_queue(&self, queue: Queue) -> bool {
        match queue {
            Queue::Blt => self.has_blt,
            Queue::Render => self.has_render,
        }
    }
}
