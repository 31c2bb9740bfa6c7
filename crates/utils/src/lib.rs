//! Helpers built on top of `unwound-scope`
//!
//! Everything here acquires through a `Context` and reports through its
//! failures, so callers get the same unwinding guarantees as the core
//! wrappers.

pub mod debug_lock;
pub mod fd;
pub mod math;
pub mod tracing;

pub use debug_lock::*;
pub use fd::*;
pub use math::*;
