//! Architecture boundary of the switch path.
//!
//! The coordinator never touches hardware directly. Everything it needs
//! from the processor goes through [`Arch`]: the register/stack swap, the
//! extended-state save and restore instructions, the access control that
//! makes the next FPU instruction trap, the two thread-pointer registers,
//! and the interrupt-enable query that backs the run-level assertion.
//!
//! All methods take `&self` and are called only on the processor the
//! implementation describes.

use core::fmt;

pub mod armv7;

/// Reason the architecture refused to save extended state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveError {
    /// The processor has no extended-state unit.
    NoCoprocessor,
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCoprocessor => write!(f, "no extended-state unit present"),
        }
    }
}

/// Processor primitives consumed by the switch path.
pub trait Arch {
    /// Saved execution context written and read by [`swap_context`](Arch::swap_context).
    type Context: Default + Send;

    /// Image of the extended (FPU/vector) register file.
    ///
    /// `Default` must be the architecture's initial FPU state, since it is
    /// what a thread sees on its first FPU instruction.
    type ExtendedState: Default + Send;

    /// Returns `true` if maskable interrupts are enabled on this processor.
    fn interrupts_enabled(&self) -> bool;

    /// Reads the user-writable thread-pointer register.
    fn user_thread_pointer(&self) -> u32;

    /// Writes the user-writable thread-pointer register.
    fn set_user_thread_pointer(&self, value: u32);

    /// Writes the thread-pointer register user mode can read but not write.
    fn set_kernel_thread_pointer(&self, value: u32);

    /// Copies the live extended registers into `state`.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError`] if the hardware cannot save into `state`.
    ///
    /// # Safety
    ///
    /// The live registers must belong to the thread that owns `state`.
    unsafe fn save_extended_state(&self, state: &mut Self::ExtendedState) -> Result<(), SaveError>;

    /// Loads the live extended registers from `state`.
    ///
    /// # Safety
    ///
    /// Direct extended-state access must be enabled, and the caller must
    /// record the owning thread as the new owner.
    unsafe fn restore_extended_state(&self, state: &Self::ExtendedState);

    /// Allows direct use of the extended registers.
    fn enable_extended_state(&self);

    /// Makes the next extended-register instruction trap.
    fn disable_extended_state(&self);

    /// Returns `true` if extended-register instructions currently execute
    /// without trapping.
    fn extended_state_enabled(&self) -> bool;

    /// Exchanges the execution context: saves the running context into
    /// `old` and resumes `new`.
    ///
    /// Returns when some processor later resumes `old`.
    ///
    /// # Safety
    ///
    /// Both pointers must reference live contexts of distinct threads, and
    /// `new` must hold a context produced by a previous swap or by thread
    /// creation.
    unsafe fn swap_context(&self, old: *mut Self::Context, new: *const Self::Context);
}
