//! Device abstraction and software simulation for the wringer
//! verification harness
//!
//! The harness drives a compute accelerator through the narrow
//! [`Device`]/[`DeviceContext`] trait surface: buffer creation, host
//! mappings with explicit coherency domains, asynchronous copy/fill
//! submission on two queues, deliberate fault injection and a small
//! diagnostics interface.
//!
//! [`SimDevice`] is the reference implementation: a deterministic
//! in-process device with real queue workers, a shadow-cache coherency
//! model and a recovery path that produces parseable crash records.

pub mod device;
pub mod error;
pub mod sim;

pub use device::{
    BufferHandle, CachingMode, CopyParams, Device, DeviceCaps, DeviceContext, DiagEntry, Domain, FillParams,
    MapAccess, MapKind, Mapping, MemKind, Queue, SpinTicket, Tiling, NO_ERROR_STATE,
};
pub use error::{DeviceError, Result};
pub use sim::{SimConfig, SimDevice};
