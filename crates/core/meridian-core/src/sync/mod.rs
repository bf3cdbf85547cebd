//! Synchronization building blocks.
//!
//! Per-processor scheduling state is serialized by run level rather than
//! by locks, so the only shared primitive here is the atomic shim that lets
//! that state be model-checked under loom.

pub mod loom_compat;
