//! Core types and primitives for the Meridian kernel.
//!
//! This crate contains host-testable abstractions shared by the scheduler
//! and the rest of the kernel: typed identifiers, interrupt run levels,
//! the logging facade, compile-time configuration and the safety-check
//! macros used around unsafe hardware primitives.
//!
//! By living outside the kernel crate, these types can be tested with
//! `cargo test` and loom on the host without a kernel target.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod config;
pub mod id;
pub mod log;
pub mod runlevel;
pub mod safety;
pub mod static_assert;
pub mod sync;
