//! Processor run levels.
//!
//! A run level is the interrupt priority a processor is currently executing
//! at. Raising the run level masks every interrupt source at or below it,
//! which is how per-processor scheduling state is serialized without locks:
//! anything that touches the current thread or the extended-state owner
//! runs at [`RunLevel::Dispatch`] or above, where the scheduler cannot be
//! re-entered.
//!
//! [`RunLevelGate`] is the per-processor holder of the level. Its checks are
//! assertions, never waits: a violated run-level contract means the kernel
//! already has a correctness bug, so it stops the processor.

use core::fmt;

use crate::sync::loom_compat::{AtomicU8, Ordering};

/// Interrupt priority level of a processor.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunLevel {
    /// Ordinary thread execution. Everything is deliverable.
    Low = 0,
    /// Scheduler level. Dispatch software interrupts and thread switches
    /// are deferred; device interrupts still arrive.
    Dispatch = 2,
    /// Highest level used by device interrupt handlers.
    MaxDevice = 11,
    /// Clock interrupt.
    Clock = 13,
    /// Inter-processor interrupts.
    Ipi = 14,
    /// Everything masked.
    High = 15,
}

impl RunLevel {
    /// Converts a raw level back into a `RunLevel`.
    pub const fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(Self::Low),
            2 => Some(Self::Dispatch),
            11 => Some(Self::MaxDevice),
            13 => Some(Self::Clock),
            14 => Some(Self::Ipi),
            15 => Some(Self::High),
            _ => None,
        }
    }

    /// Returns the raw level.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RunLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Dispatch => "dispatch",
            Self::MaxDevice => "max-device",
            Self::Clock => "clock",
            Self::Ipi => "ipi",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

/// Per-processor run-level state.
///
/// Only the owning processor writes the level. Interrupt handlers on that
/// processor may read it, which is why it is atomic.
pub struct RunLevelGate {
    level: AtomicU8,
}

impl RunLevelGate {
    /// Creates a gate at [`RunLevel::Low`].
    #[cfg(not(loom))]
    pub const fn new() -> Self {
        Self {
            level: AtomicU8::new(RunLevel::Low as u8),
        }
    }

    /// Creates a gate at [`RunLevel::Low`].
    #[cfg(loom)]
    pub fn new() -> Self {
        Self {
            level: AtomicU8::new(RunLevel::Low as u8),
        }
    }

    /// Returns the processor's active run level.
    pub fn current(&self) -> RunLevel {
        let raw = self.level.load(Ordering::Acquire);
        match RunLevel::from_u8(raw) {
            Some(level) => level,
            None => crate::kpanic!("run level gate holds invalid level {}", raw),
        }
    }

    /// Raises the run level to `new`, returning the previous level.
    ///
    /// Raising to the current level is allowed.
    ///
    /// # Panics
    ///
    /// Panics if `new` is below the current level.
    pub fn raise(&self, new: RunLevel) -> RunLevel {
        let old = self.current();
        if new < old {
            crate::kpanic!("run level raise from {} to lower level {}", old, new);
        }
        self.level.store(new as u8, Ordering::Release);
        old
    }

    /// Restores a level previously returned by [`raise`](Self::raise).
    ///
    /// # Panics
    ///
    /// Panics if `old` is above the current level.
    pub fn lower(&self, old: RunLevel) {
        let current = self.current();
        if old > current {
            crate::kpanic!("run level lower from {} to higher level {}", current, old);
        }
        self.level.store(old as u8, Ordering::Release);
    }

    /// Raises the run level for the lifetime of the returned guard.
    pub fn raise_guard(&self, new: RunLevel) -> RunLevelGuard<'_> {
        let old = self.raise(new);
        RunLevelGuard { gate: self, old }
    }

    /// Asserts that the processor is excluded from scheduler re-entry.
    ///
    /// Holds if the run level is at least `min`, or if interrupts are
    /// disabled outright (which excludes re-entry just as well).
    ///
    /// # Panics
    ///
    /// Panics if the level is below `min` and interrupts are enabled.
    pub fn require_at_least(&self, min: RunLevel, interrupts_enabled: bool) {
        let current = self.current();
        if current < min && interrupts_enabled {
            crate::kpanic!(
                "run level {} below required {} with interrupts enabled",
                current,
                min
            );
        }
    }
}

impl Default for RunLevelGate {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that restores the previous run level on drop.
pub struct RunLevelGuard<'a> {
    gate: &'a RunLevelGate,
    old: RunLevel,
}

impl RunLevelGuard<'_> {
    /// Returns the level that will be restored on drop.
    pub fn previous(&self) -> RunLevel {
        self.old
    }
}

impl Drop for RunLevelGuard<'_> {
    fn drop(&mut self) {
        self.gate.lower(self.old);
    }
}
