//! ARMv7-A primitives (kernel target only).

use core::arch::asm;

use meridian_core::assert_unsafe_precondition;

use super::regs::{Fpexc, SwitchFrame, VfpState, cpacr, cpsr};
use crate::arch::{Arch, SaveError};

unsafe extern "C" {
    /// Register/stack swap, implemented in the platform's assembly.
    ///
    /// Pushes `r4`-`r11` and `lr`, stores `sp` into `old`, loads `sp` from
    /// `new`, pops and returns into the resumed thread.
    fn meridian_swap_context(old: *mut SwitchFrame, new: *const SwitchFrame);
}

/// The ARMv7-A processor the kernel is running on.
#[derive(Debug, Default, Clone, Copy)]
pub struct Armv7;

impl Armv7 {
    #[inline]
    fn read_fpexc() -> u32 {
        let val: u32;
        // SAFETY: Reading FPEXC is permitted in PL1 whether or not VFP is enabled.
        unsafe {
            asm!("vmrs {}, fpexc", out(reg) val, options(nomem, nostack, preserves_flags));
        }
        val
    }

    #[inline]
    fn read_cpacr() -> u32 {
        let val: u32;
        // SAFETY: Reading CPACR in PL1 has no side effects.
        unsafe {
            asm!("mrc p15, 0, {}, c1, c0, 2", out(reg) val, options(nomem, nostack, preserves_flags));
        }
        val
    }

    #[inline]
    fn write_fpexc(val: u32) {
        // SAFETY: Writing FPEXC only changes VFP access control and exception state.
        unsafe {
            asm!("vmsr fpexc, {}", in(reg) val, options(nomem, nostack, preserves_flags));
        }
    }
}

impl Arch for Armv7 {
    type Context = SwitchFrame;
    type ExtendedState = VfpState;

    #[inline]
    fn interrupts_enabled(&self) -> bool {
        let val: u32;
        // SAFETY: Reading CPSR has no side effects.
        unsafe {
            asm!("mrs {}, cpsr", out(reg) val, options(nomem, nostack, preserves_flags));
        }
        cpsr::irqs_enabled(val)
    }

    #[inline]
    fn user_thread_pointer(&self) -> u32 {
        let val: u32;
        // SAFETY: TPIDRURW is readable from PL1 with no side effects.
        unsafe {
            asm!("mrc p15, 0, {}, c13, c0, 2", out(reg) val, options(nomem, nostack, preserves_flags));
        }
        val
    }

    #[inline]
    fn set_user_thread_pointer(&self, value: u32) {
        // SAFETY: TPIDRURW is a scratch register owned by the running thread.
        unsafe {
            asm!("mcr p15, 0, {}, c13, c0, 2", in(reg) value, options(nomem, nostack, preserves_flags));
        }
    }

    #[inline]
    fn set_kernel_thread_pointer(&self, value: u32) {
        // SAFETY: TPIDRURO is only consulted by user mode of the running thread.
        unsafe {
            asm!("mcr p15, 0, {}, c13, c0, 3", in(reg) value, options(nomem, nostack, preserves_flags));
        }
    }

    unsafe fn save_extended_state(&self, state: &mut VfpState) -> Result<(), SaveError> {
        if !cpacr::vfp_accessible(Self::read_cpacr()) {
            return Err(SaveError::NoCoprocessor);
        }
        let ptr = core::ptr::from_mut(state);

        // The owner may be saved with access already revoked; VFP stores
        // need EN set, so enable around the save and put FPEXC back.
        let fpexc = Self::read_fpexc();
        Self::write_fpexc(Fpexc::enabled(fpexc));

        let fpscr: u32;
        // SAFETY: `ptr` is a VfpState, whose first 256 bytes hold d0-d31.
        unsafe {
            asm!(
                "vstmia {ptr}!, {{d0-d15}}",
                "vstmia {ptr}, {{d16-d31}}",
                "vmrs {fpscr}, fpscr",
                ptr = inout(reg) ptr.cast::<u64>() => _,
                fpscr = out(reg) fpscr,
                options(nostack, preserves_flags),
            );
        }
        state.fpscr = fpscr;

        Self::write_fpexc(fpexc);
        Ok(())
    }

    unsafe fn restore_extended_state(&self, state: &VfpState) {
        let ptr = core::ptr::from_ref(state);
        assert_unsafe_precondition!(
            Fpexc::from_bits_truncate(Self::read_fpexc()).contains(Fpexc::EN),
            "VFP restore with access disabled"
        );

        // SAFETY: `ptr` is a VfpState and VFP access is enabled.
        unsafe {
            asm!(
                "vldmia {ptr}!, {{d0-d15}}",
                "vldmia {ptr}, {{d16-d31}}",
                "vmsr fpscr, {fpscr}",
                ptr = inout(reg) ptr.cast::<u64>() => _,
                fpscr = in(reg) state.fpscr,
                options(nostack, preserves_flags),
            );
        }
    }

    #[inline]
    fn enable_extended_state(&self) {
        Self::write_fpexc(Fpexc::enabled(Self::read_fpexc()));
    }

    #[inline]
    fn disable_extended_state(&self) {
        Self::write_fpexc(Fpexc::disabled(Self::read_fpexc()));
    }

    #[inline]
    fn extended_state_enabled(&self) -> bool {
        Fpexc::from_bits_truncate(Self::read_fpexc()).contains(Fpexc::EN)
    }

    unsafe fn swap_context(&self, old: *mut SwitchFrame, new: *const SwitchFrame) {
        assert_unsafe_precondition!(!core::ptr::eq(old, new), "context swapped with itself");
        // SAFETY: Caller guarantees both frames belong to live, distinct threads.
        unsafe { meridian_swap_context(old, new) };
    }
}
