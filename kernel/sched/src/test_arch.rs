//! Recording architecture for host tests.
//!
//! Models one processor: a live FPU register file holding a single value, the
//! FPU access-enable bit, the interrupt flag and both thread-pointer
//! registers. Every primitive call is appended to an event log so tests can
//! check ordering.

use std::cell::{Cell, RefCell};
use std::vec::Vec;

use crate::arch::{Arch, SaveError};

/// A primitive call observed by [`TestArch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArchEvent {
    ReadThreadPointer,
    WriteThreadPointer(u32),
    WriteKernelThreadPointer(u32),
    Save(u64),
    Restore(u64),
    Enable,
    Disable,
    Swap,
}

/// Extended state of the model: the FPU register file is one value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct TestFpuState {
    pub value: u64,
}

/// Saved context of the model. Counts how often it was swapped out.
#[derive(Debug, Default)]
pub(crate) struct TestContext {
    pub swapped_out: u32,
}

#[derive(Debug)]
pub(crate) struct TestArch {
    events: RefCell<Vec<ArchEvent>>,
    fpu: Cell<u64>,
    fpu_enabled: Cell<bool>,
    interrupts: Cell<bool>,
    user_tp: Cell<u32>,
    kernel_tp: Cell<u32>,
    fail_saves: Cell<Option<SaveError>>,
}

impl TestArch {
    /// A processor with interrupts enabled and FPU access disabled.
    pub(crate) fn new() -> Self {
        Self {
            events: RefCell::new(Vec::new()),
            fpu: Cell::new(0),
            fpu_enabled: Cell::new(false),
            interrupts: Cell::new(true),
            user_tp: Cell::new(0),
            kernel_tp: Cell::new(0),
            fail_saves: Cell::new(None),
        }
    }

    pub(crate) fn events(&self) -> Vec<ArchEvent> {
        self.events.borrow().clone()
    }

    pub(crate) fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    pub(crate) fn count(&self, matches: impl Fn(&ArchEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| matches(e)).count()
    }

    /// Value currently in the live FPU registers.
    pub(crate) fn fpu_value(&self) -> u64 {
        self.fpu.get()
    }

    /// Simulates an FPU instruction writing the live registers.
    ///
    /// Returns `false` without touching them when access is disabled, which
    /// is where real hardware would trap.
    pub(crate) fn write_fpu(&self, value: u64) -> bool {
        if !self.fpu_enabled.get() {
            return false;
        }
        self.fpu.set(value);
        true
    }

    /// Simulates user code writing the thread-pointer register.
    pub(crate) fn user_writes_thread_pointer(&self, value: u32) {
        self.user_tp.set(value);
    }

    /// Value currently in the user-read-only thread-pointer register.
    pub(crate) fn kernel_thread_pointer(&self) -> u32 {
        self.kernel_tp.get()
    }

    pub(crate) fn set_interrupts(&self, enabled: bool) {
        self.interrupts.set(enabled);
    }

    pub(crate) fn fail_saves_with(&self, error: SaveError) {
        self.fail_saves.set(Some(error));
    }

    fn record(&self, event: ArchEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Arch for TestArch {
    type Context = TestContext;
    type ExtendedState = TestFpuState;

    fn interrupts_enabled(&self) -> bool {
        self.interrupts.get()
    }

    fn user_thread_pointer(&self) -> u32 {
        self.record(ArchEvent::ReadThreadPointer);
        self.user_tp.get()
    }

    fn set_user_thread_pointer(&self, value: u32) {
        self.record(ArchEvent::WriteThreadPointer(value));
        self.user_tp.set(value);
    }

    fn set_kernel_thread_pointer(&self, value: u32) {
        self.record(ArchEvent::WriteKernelThreadPointer(value));
        self.kernel_tp.set(value);
    }

    unsafe fn save_extended_state(&self, state: &mut TestFpuState) -> Result<(), SaveError> {
        if let Some(error) = self.fail_saves.get() {
            return Err(error);
        }
        self.record(ArchEvent::Save(self.fpu.get()));
        state.value = self.fpu.get();
        Ok(())
    }

    unsafe fn restore_extended_state(&self, state: &TestFpuState) {
        assert!(self.fpu_enabled.get(), "restore with FPU access disabled");
        self.record(ArchEvent::Restore(state.value));
        self.fpu.set(state.value);
    }

    fn enable_extended_state(&self) {
        self.record(ArchEvent::Enable);
        self.fpu_enabled.set(true);
    }

    fn disable_extended_state(&self) {
        self.record(ArchEvent::Disable);
        self.fpu_enabled.set(false);
    }

    fn extended_state_enabled(&self) -> bool {
        self.fpu_enabled.get()
    }

    unsafe fn swap_context(&self, old: *mut TestContext, new: *const TestContext) {
        assert!(!core::ptr::eq(old, new), "context swapped with itself");
        self.record(ArchEvent::Swap);
        // SAFETY: Caller guarantees `old` is a live context.
        unsafe { (*old).swapped_out += 1 };
    }
}
