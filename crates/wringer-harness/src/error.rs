//! Error types for harness cases

use wringer_device::DeviceError;

/// Result type for case execution
pub type Result<T> = std::result::Result<T, CaseError>;

/// Ways a verification case can fail
#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    /// Buffer contents did not match the expected pattern
    #[error("content mismatch at element {index}: expected {expected:#010x}, found {actual:#010x}")]
    CompareMismatch {
        index: usize,
        expected: u32,
        actual: u32,
    },

    /// The device missed completion notifications during the run
    #[error("{count} completion notification(s) missed during the run")]
    MissedNotifications { count: u64 },

    /// A crash record could not be parsed
    #[error("malformed crash record: {0}")]
    CrashRecordMalformed(String),

    /// A crash record parsed but did not describe the injected fault
    #[error("crash record mismatch: {0}")]
    CrashRecordMismatch(String),

    /// A concurrency-wrapper worker panicked
    #[error("worker thread panicked")]
    WorkerPanicked,

    /// Underlying device error
    #[error(transparent)]
    Device(#[from] DeviceError),
}
