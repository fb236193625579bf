//! Scenario-matrix verification harness
//!
//! Drives a [`wringer_device::Device`] through the cross product of
//! access strategies, copy engines, operation scenarios, concurrency
//! wrappers, working-set sizes and fault injections, checking buffer
//! contents at every step. See [`matrix`] for how cases are built and
//! named.

pub mod access;
pub mod buffers;
pub mod context;
pub mod copy;
pub mod crashdump;
pub mod error;
pub mod hang;
pub mod matrix;
pub mod scenario;
pub mod wrapper;

pub use access::AccessStrategy;
pub use buffers::{BufRef, BufferSet, Geometry, TestBuffer, MIN_BUFFERS};
pub use context::Harness;
pub use copy::CopyEngine;
pub use error::{CaseError, Result};
pub use hang::{HangGuard, HangKind};
pub use matrix::{build_cases, run_case, run_matrix, Case, CaseKind, Outcome, Report, SizeClass};
pub use scenario::Scenario;
pub use wrapper::Wrapper;
