//! Lazy extended-state (FPU) ownership.
//!
//! A processor's FPU registers are not saved and restored on every switch.
//! Instead at most one thread per processor *owns* them: its authoritative
//! FPU state is the live register file, and its buffer may be stale. Every
//! switch away from a thread ends that ownership, saving the registers only
//! if the thread actually owned them, and turns FPU access off. The next
//! FPU instruction on the processor traps into
//! [`handle_extended_state_trap`], which restores the faulting thread's
//! buffer and makes it the owner.
//!
//! Because ownership never survives a switch, a thread can resume on any
//! processor without its state being stuck in another processor's
//! registers.

extern crate alloc;

use alloc::boxed::Box;

use meridian_core::runlevel::RunLevel;
use meridian_core::{kdebug, kpanic, ktrace};

use crate::arch::Arch;
use crate::processor::ProcessorBlock;
use crate::thread::Thread;

/// What [`release_ownership`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The thread never used the FPU. Nothing was touched.
    Unused,
    /// The thread used the FPU but its buffer was already released; only
    /// the flags and the access control were reset.
    BufferReleased,
    /// The thread had a buffer but did not own the registers, so the
    /// buffer was already current.
    Clean,
    /// The live registers were saved into the thread's buffer.
    Saved,
}

/// Ends `outgoing`'s FPU ownership on `block`'s processor.
///
/// For a thread that has used the FPU: save the live registers into its
/// buffer if it owns them and still has a buffer, clear ownership on the
/// thread and the processor, then disable FPU access so the next FPU
/// instruction traps. A thread that never used the FPU costs nothing.
///
/// # Panics
///
/// Panics if the processor is below [`RunLevel::Dispatch`] with interrupts
/// enabled, if `outgoing` claims ownership the processor does not record,
/// or if the architecture refuses the save.
pub fn release_ownership<A: Arch>(block: &ProcessorBlock, outgoing: &mut Thread<A>, arch: &A) -> Release {
    block
        .run_level()
        .require_at_least(RunLevel::Dispatch, arch.interrupts_enabled());

    if !outgoing.uses_extended_state() {
        return Release::Unused;
    }

    let id = outgoing.id();
    let owner = outgoing.is_extended_state_owner();

    let outcome = match outgoing.extended_state_mut() {
        None => Release::BufferReleased,
        Some(_) if !owner => Release::Clean,
        Some(buffer) => {
            // SAFETY: The thread owns the FPU, so the live registers are its own.
            if let Err(err) = unsafe { arch.save_extended_state(buffer) } {
                kpanic!("thread {}: extended state save failed on cpu {}: {}", id, block.cpu(), err);
            }
            Release::Saved
        }
    };

    if owner {
        if block.extended_state_owner() != Some(id) {
            kpanic!(
                "thread {} owns the FPU but cpu {} records {:?}",
                id,
                block.cpu(),
                block.extended_state_owner()
            );
        }
        outgoing.set_extended_state_owner(false);
        block.set_extended_state_owner(None);
    }

    arch.disable_extended_state();
    outcome
}

/// What [`handle_extended_state_trap`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restore {
    /// First FPU use: a buffer in the initial state was allocated and loaded.
    Initialized,
    /// The thread's saved buffer was loaded.
    Restored,
    /// The thread already owned the registers; access was only re-enabled.
    AlreadyOwner,
}

/// Handles an FPU instruction executed with access disabled.
///
/// Enables FPU access, loads `thread`'s buffer (allocating one in the
/// architecture's initial state on first use) and makes `thread` the owner
/// on `block`'s processor.
///
/// # Panics
///
/// Panics if `thread` is not the processor's current thread, if another
/// thread still owns the processor's FPU, or if `thread` uses the FPU after
/// its buffer was released during termination.
pub fn handle_extended_state_trap<A: Arch>(block: &ProcessorBlock, thread: &mut Thread<A>, arch: &A) -> Restore {
    block
        .run_level()
        .require_at_least(RunLevel::Dispatch, arch.interrupts_enabled());

    let id = thread.id();
    if block.current_thread() != id {
        kpanic!(
            "FPU trap for thread {} but cpu {} is running {}",
            id,
            block.cpu(),
            block.current_thread()
        );
    }

    if thread.is_extended_state_owner() {
        arch.enable_extended_state();
        return Restore::AlreadyOwner;
    }

    if let Some(other) = block.extended_state_owner() {
        kpanic!("FPU trap for thread {} while {} owns cpu {}", id, other, block.cpu());
    }

    if thread.uses_extended_state() && !thread.has_extended_state() {
        kpanic!("thread {} ({}) used the FPU after releasing its extended state", id, thread.state());
    }

    arch.enable_extended_state();

    let outcome = if thread.has_extended_state() {
        Restore::Restored
    } else {
        kdebug!("thread {}: first FPU use on cpu {}", id, block.cpu());
        thread.install_extended_state(Box::default());
        Restore::Initialized
    };

    if let Some(buffer) = thread.extended_state() {
        // SAFETY: Access is enabled and ownership is recorded below.
        unsafe { arch.restore_extended_state(buffer) };
    }

    thread.mark_uses_extended_state();
    thread.set_extended_state_owner(true);
    block.set_extended_state_owner(Some(id));
    ktrace!("thread {}: took FPU ownership on cpu {}", id, block.cpu());
    outcome
}
