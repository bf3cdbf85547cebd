//! Thread records, lazy FPU ownership and context-switch coordination.
//!
//! The switch path of one processor: [`thread::Thread`] holds the state a
//! thread carries between processors, [`processor::ProcessorBlock`] the
//! state of the processor itself, [`fpu`] the lazy extended-state protocol
//! and [`switch`] the bookkeeping around the architecture's register/stack
//! swap. [`dispatch::Dispatcher`] drives them from a per-processor ready
//! queue.
//!
//! Everything hardware-specific sits behind [`arch::Arch`], so the whole
//! crate except the ARMv7 primitives is tested on the host.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod arch;
pub mod dispatch;
pub mod error;
pub mod fpu;
pub mod processor;
pub mod queue;
pub mod switch;
pub mod thread;
pub mod trap;

#[cfg(test)]
pub(crate) mod test_arch;
