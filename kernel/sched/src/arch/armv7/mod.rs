//! ARMv7-A backend.
//!
//! Extended state is the VFPv3-D32 register file, access to which is gated
//! by `FPEXC.EN`: clearing it turns the next VFP instruction into an
//! undefined-instruction trap, which the kernel routes to the lazy restore
//! handler. The user thread pointer is `TPIDRURW`, a 32-bit register;
//! `TPIDRURO` holds the low half of the wide thread pointer and is loaded by
//! the swap primitive itself.

pub mod regs;

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod cpu;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use cpu::Armv7;
