//! ARMv7 register layouts used by the switch path.
//!
//! Pure data definitions, compiled on every target so they can be checked
//! on the host.

use meridian_core::static_assert;

bitflags::bitflags! {
    /// Floating-point exception control register (FPEXC).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Fpexc: u32 {
        /// Asynchronous exception pending.
        const EX = 1 << 31;
        /// VFP/NEON enable. Clear means every VFP instruction is undefined.
        const EN = 1 << 30;
        /// Input denormal cumulative flag.
        const IDF = 1 << 7;
        /// Inexact cumulative flag.
        const IXF = 1 << 4;
        /// Underflow cumulative flag.
        const UFF = 1 << 3;
        /// Overflow cumulative flag.
        const OFF = 1 << 2;
        /// Division by zero cumulative flag.
        const DZF = 1 << 1;
        /// Invalid operation cumulative flag.
        const IOF = 1 << 0;
    }
}

impl Fpexc {
    /// Returns `raw` with the enable bit set, leaving the rest untouched.
    pub const fn enabled(raw: u32) -> u32 {
        raw | Self::EN.bits()
    }

    /// Returns `raw` with the enable bit cleared and any pending
    /// asynchronous exception discarded.
    pub const fn disabled(raw: u32) -> u32 {
        raw & !(Self::EN.bits() | Self::EX.bits())
    }
}

/// Current program status register bits consulted by the switch path.
pub mod cpsr {
    /// IRQ mask bit. Set means IRQs are disabled.
    pub const IRQ_MASK: u32 = 1 << 7;
    /// FIQ mask bit.
    pub const FIQ_MASK: u32 = 1 << 6;

    /// Returns `true` if IRQs are deliverable under `raw`.
    pub const fn irqs_enabled(raw: u32) -> bool {
        raw & IRQ_MASK == 0
    }
}

/// Coprocessor access control register (CPACR) bits for VFP.
pub mod cpacr {
    /// Full PL0 and PL1 access to cp10 and cp11.
    pub const VFP_FULL_ACCESS: u32 = 0xF << 20;

    /// Returns `true` if the VFP coprocessors are present and accessible
    /// under `raw`. Absent coprocessors read back as no access.
    pub const fn vfp_accessible(raw: u32) -> bool {
        raw & VFP_FULL_ACCESS == VFP_FULL_ACCESS
    }
}

/// Saved VFPv3-D32 register file.
///
/// Layout is fixed: `vstmia`/`vldmia` write `d0`-`d31` back to back at the
/// start of the structure.
#[repr(C, align(16))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfpState {
    /// Double-precision registers `d0`-`d31`.
    pub registers: [u64; 32],
    /// Floating-point status and control register.
    pub fpscr: u32,
    reserved: [u32; 3],
}

static_assert!(core::mem::size_of::<VfpState>() == 272);
static_assert!(core::mem::align_of::<VfpState>() == 16);

impl VfpState {
    /// Returns a zeroed register image with default-NaN off and
    /// round-to-nearest, the state a thread sees on its first VFP use.
    pub const fn initial() -> Self {
        Self {
            registers: [0; 32],
            fpscr: 0,
            reserved: [0; 3],
        }
    }
}

impl Default for VfpState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Saved execution context for the ARMv7 swap primitive.
///
/// The primitive pushes the callee-saved registers and the return address
/// on the outgoing kernel stack and records the resulting stack pointer
/// here, so the stack pointer is the whole context.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SwitchFrame {
    /// Kernel stack pointer at the moment of the swap.
    pub stack_pointer: usize,
}
