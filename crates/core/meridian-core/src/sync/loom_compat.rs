//! Loom compatibility shim.
//!
//! When compiled with `cfg(loom)`, re-exports loom's atomics so the
//! processor block and run-level gate can be model-checked under loom's
//! deterministic scheduler. Otherwise, re-exports `core::sync::atomic`.

#[cfg(loom)]
pub use loom::sync::atomic::{AtomicU8, AtomicU64, Ordering};

#[cfg(not(loom))]
pub use core::sync::atomic::{AtomicU8, AtomicU64, Ordering};
