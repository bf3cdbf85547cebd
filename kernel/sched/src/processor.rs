//! Per-processor block.
//!
//! One [`ProcessorBlock`] exists per processor from bring-up to teardown.
//! It records which thread the processor is running, which thread's state
//! currently lives in the processor's FPU registers, and the processor's run
//! level. It is passed explicitly to every switch operation rather than
//! looked up through a hidden global.
//!
//! Writers are the owning processor only, at dispatch level. The fields are
//! atomic so interrupt handlers and remote processors (IPIs, diagnostics)
//! can read a consistent view: the owner is always cleared before the
//! current thread changes, and readers acquire the current thread first.

use meridian_core::config::MAX_CPUS;
use meridian_core::id::{CpuId, ThreadId};
use meridian_core::kpanic;
use meridian_core::runlevel::RunLevelGate;
use meridian_core::sync::loom_compat::{AtomicU64, Ordering};

/// State of one processor.
pub struct ProcessorBlock {
    cpu: CpuId,
    run_level: RunLevelGate,
    current: AtomicU64,
    extended_state_owner: AtomicU64,
}

impl ProcessorBlock {
    /// Brings up the block for `cpu`, already running `boot_thread`.
    ///
    /// # Panics
    ///
    /// Panics if `cpu` is not below [`MAX_CPUS`].
    pub fn new(cpu: CpuId, boot_thread: ThreadId) -> Self {
        if cpu.as_usize() >= MAX_CPUS {
            kpanic!("cpu {} exceeds MAX_CPUS ({})", cpu, MAX_CPUS);
        }
        Self {
            cpu,
            run_level: RunLevelGate::new(),
            current: AtomicU64::new(boot_thread.as_u64()),
            extended_state_owner: AtomicU64::new(ThreadId::to_raw(None)),
        }
    }

    /// Returns the processor this block describes.
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    /// Returns the processor's run-level gate.
    pub fn run_level(&self) -> &RunLevelGate {
        &self.run_level
    }

    /// Returns the thread running on this processor.
    pub fn current_thread(&self) -> ThreadId {
        let raw = self.current.load(Ordering::Acquire);
        match ThreadId::from_raw(raw) {
            Some(id) => id,
            None => kpanic!("cpu {}: no current thread", self.cpu),
        }
    }

    /// Returns the thread whose extended state is live in this processor's
    /// FPU registers, if any.
    pub fn extended_state_owner(&self) -> Option<ThreadId> {
        ThreadId::from_raw(self.extended_state_owner.load(Ordering::Acquire))
    }

    pub(crate) fn set_current_thread(&self, id: ThreadId) {
        self.current.store(id.as_u64(), Ordering::Release);
    }

    pub(crate) fn set_extended_state_owner(&self, owner: Option<ThreadId>) {
        self.extended_state_owner
            .store(ThreadId::to_raw(owner), Ordering::Release);
    }
}

impl core::fmt::Debug for ProcessorBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessorBlock")
            .field("cpu", &self.cpu)
            .field("run_level", &self.run_level.current())
            .field("current", &self.current_thread())
            .field("extended_state_owner", &self.extended_state_owner())
            .finish()
    }
}
