//! Context-switch coordination.
//!
//! A switch on one processor is three steps, always in this order:
//!
//! 1. [`prepare_switch`] on the outgoing thread: cache the user-writable
//!    half of its thread pointer and end its FPU ownership.
//! 2. [`Arch::swap_context`]: the register/stack swap. It returns only when
//!    some processor later resumes the outgoing thread.
//! 3. [`finish_switch`] on whichever thread resumed: publish it as the
//!    processor's current thread and load both halves of its thread
//!    pointer.
//!
//! All three run at [`RunLevel::Dispatch`] or above (or with interrupts
//! disabled) on the processor described by the block.

use meridian_core::kpanic;
use meridian_core::runlevel::RunLevel;

use crate::arch::Arch;
use crate::fpu::{self, Release};
use crate::processor::ProcessorBlock;
use crate::thread::Thread;

/// Reconciles `outgoing`'s per-thread processor state before the swap to
/// `incoming`.
///
/// Leaves no FPU owner on the processor and FPU access disabled, so
/// `outgoing` may later resume on any processor.
///
/// # Panics
///
/// Panics if the processor is below [`RunLevel::Dispatch`] with interrupts
/// enabled, if `outgoing` is not the processor's current thread, or on any
/// fatal condition of [`fpu::release_ownership`].
pub fn prepare_switch<A: Arch>(
    block: &ProcessorBlock,
    outgoing: &mut Thread<A>,
    incoming: &Thread<A>,
    arch: &A,
) -> Release {
    block
        .run_level()
        .require_at_least(RunLevel::Dispatch, arch.interrupts_enabled());

    if block.current_thread() != outgoing.id() {
        kpanic!(
            "switch away from thread {} but cpu {} is running {}",
            outgoing.id(),
            block.cpu(),
            block.current_thread()
        );
    }
    debug_assert_ne!(outgoing.id(), incoming.id(), "switch to self");

    // User mode may have changed it since the last resume.
    outgoing.cache_thread_pointer_high(arch.user_thread_pointer());

    fpu::release_ownership(block, outgoing, arch)
}

/// Completes a switch on the thread that just resumed.
///
/// # Panics
///
/// Panics if the processor is below [`RunLevel::Dispatch`] with interrupts
/// enabled, or if a thread other than `resumed` still owns the FPU.
pub fn finish_switch<A: Arch>(block: &ProcessorBlock, resumed: &Thread<A>, arch: &A) {
    block
        .run_level()
        .require_at_least(RunLevel::Dispatch, arch.interrupts_enabled());

    if let Some(owner) = block.extended_state_owner().filter(|&owner| owner != resumed.id()) {
        kpanic!(
            "thread {} resumed on cpu {} while {} owns the FPU",
            resumed.id(),
            block.cpu(),
            owner
        );
    }

    block.set_current_thread(resumed.id());
    let thread_pointer = resumed.thread_pointer();
    arch.set_kernel_thread_pointer(thread_pointer.low());
    arch.set_user_thread_pointer(thread_pointer.high());
}
