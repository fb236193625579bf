//! Error types for device operations

use crate::device::types::{BufferHandle, Queue};

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that can occur while driving a device context
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Invalid buffer handle
    #[error("invalid buffer handle: {0}")]
    InvalidHandle(u64),

    /// Buffer access out of bounds
    #[error("buffer access out of bounds: offset {offset} + size {size} > buffer size {buffer_size}")]
    OutOfBounds {
        offset: usize,
        size: usize,
        buffer_size: usize,
    },

    /// Allocation failed
    #[error("allocation of {requested} bytes failed: {available} bytes available")]
    OutOfMemory { requested: u64, available: u64 },

    /// The named queue is not present on this device
    #[error("queue unavailable: {0}")]
    QueueUnavailable(Queue),

    /// Operation not supported by the device or memory kind
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A buffer was closed while mappings were still live
    #[error("{handle} still has {mappings} live mapping(s)")]
    MappingsOutstanding { handle: BufferHandle, mappings: usize },

    /// A queue failed to return to an operable state after a fault
    #[error("queue {queue} did not recover: {reason}")]
    RecoveryFailed { queue: Queue, reason: String },

    /// Unknown diagnostics entry
    #[error("no such diagnostics entry: {0}")]
    NoSuchEntry(String),

    /// Malformed input to a diagnostics entry
    #[error("diagnostics entry {entry} rejected input: {reason}")]
    BadDiagInput { entry: String, reason: String },
}

impl DeviceError {
    /// Create an unsupported-operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
