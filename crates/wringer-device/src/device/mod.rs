//! Device abstraction: trait surface and shared types

pub mod traits;
pub mod types;

pub use traits::{Device, DeviceContext, MapAccess, Mapping};
pub use types::{
    BufferHandle, CachingMode, CopyParams, DeviceCaps, DiagEntry, Domain, FillParams, MapKind, MemKind, Queue,
    SpinTicket, Tiling, NO_ERROR_STATE,
};
