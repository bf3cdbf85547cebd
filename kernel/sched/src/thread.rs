//! Thread records.
//!
//! A [`Thread`] is the per-thread state the switch path reconciles: the
//! saved execution context, the extended-state buffer with its usage and
//! ownership flags, and the cached wide thread pointer. The scheduler owns
//! the records; processors only refer to them by [`ThreadId`].

extern crate alloc;

use alloc::boxed::Box;
use core::fmt;

use meridian_core::id::ThreadId;
use meridian_core::{kpanic, static_assert};

use crate::arch::Arch;

/// Lifecycle state of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Runnable, waiting in a ready queue.
    Ready,
    /// Executing on a processor.
    Running,
    /// Waiting on a resource.
    Blocked,
    /// Exit requested; resources are being torn down.
    Terminating,
    /// Fully torn down. Absorbing.
    Terminated,
}

impl ThreadState {
    /// Returns `true` if the scheduler may move a thread from `self` to `next`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Ready, Self::Running)
                | (Self::Running, Self::Ready | Self::Blocked | Self::Terminating)
                | (Self::Blocked, Self::Ready)
                | (Self::Terminating, Self::Terminated)
        )
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Thread priority tier.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Interrupt bottom halves and latency-critical kernel threads.
    Critical = 0,
    /// Normal kernel and user threads.
    Normal = 1,
    /// Housekeeping that only runs when nothing else wants the processor.
    Background = 2,
}

impl Priority {
    /// Number of priority tiers.
    pub const COUNT: usize = 3;
}

/// Creation-time metadata of a thread.
#[derive(Debug, Clone, Copy)]
pub struct ThreadMeta {
    /// Human-readable name for debugging.
    pub name: &'static str,
    /// Priority tier.
    pub priority: Priority,
}

impl Default for ThreadMeta {
    fn default() -> Self {
        Self {
            name: "<anon>",
            priority: Priority::Normal,
        }
    }
}

impl ThreadMeta {
    /// Creates metadata with a name and default priority.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            priority: Priority::Normal,
        }
    }

    /// Sets the priority.
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// A thread-local storage base wider than the architecture's register.
///
/// The low half lives in the thread register user mode can only read, which
/// the switch path loads from the record on every resume. The high half is
/// exposed to user mode through the writable thread register, so user code
/// can change it behind the kernel's back; the switch path caches it here
/// before the swap and writes it back after.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct WideThreadPointer(u64);

static_assert!(core::mem::size_of::<WideThreadPointer>() == 8);

impl WideThreadPointer {
    /// Creates a thread pointer from its full value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the half kept only in the record.
    #[allow(clippy::cast_possible_truncation, reason = "selecting the low word")]
    pub const fn low(self) -> u32 {
        self.0 as u32
    }

    /// Returns the half cached by the switch path.
    #[allow(clippy::cast_possible_truncation, reason = "selecting the high word")]
    pub const fn high(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Replaces the cached half.
    pub fn set_high(&mut self, high: u32) {
        self.0 = (self.0 & 0xFFFF_FFFF) | (u64::from(high) << 32);
    }
}

/// A schedulable thread.
pub struct Thread<A: Arch> {
    id: ThreadId,
    meta: ThreadMeta,
    state: ThreadState,
    context: A::Context,
    extended_state: Option<Box<A::ExtendedState>>,
    uses_extended_state: bool,
    extended_state_owner: bool,
    thread_pointer: WideThreadPointer,
}

impl<A: Arch> Thread<A> {
    /// Creates a Ready thread that has never touched the FPU.
    pub fn new(id: ThreadId, meta: ThreadMeta) -> Self {
        Self {
            id,
            meta,
            state: ThreadState::Ready,
            context: A::Context::default(),
            extended_state: None,
            uses_extended_state: false,
            extended_state_owner: false,
            thread_pointer: WideThreadPointer::default(),
        }
    }

    /// Creates the record of the thread a processor is already running at
    /// bring-up (its boot or idle thread), which skips the Ready state.
    pub fn new_running(id: ThreadId, meta: ThreadMeta) -> Self {
        Self {
            state: ThreadState::Running,
            ..Self::new(id, meta)
        }
    }

    /// Returns the thread's id.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Returns the creation metadata.
    pub fn meta(&self) -> &ThreadMeta {
        &self.meta
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Moves the thread to `next`.
    ///
    /// # Panics
    ///
    /// Panics if the transition is not part of the state machine.
    pub fn set_state(&mut self, next: ThreadState) {
        if !self.state.can_transition_to(next) {
            kpanic!(
                "thread {} ({}): illegal transition {} -> {}",
                self.id,
                self.meta.name,
                self.state,
                next
            );
        }
        self.state = next;
    }

    /// Returns `true` once the thread has trapped into FPU use.
    pub fn uses_extended_state(&self) -> bool {
        self.uses_extended_state
    }

    /// Returns `true` if the live FPU registers, not the buffer, hold this
    /// thread's authoritative extended state.
    pub fn is_extended_state_owner(&self) -> bool {
        self.extended_state_owner
    }

    /// Returns `true` if the thread still has an extended-state buffer.
    pub fn has_extended_state(&self) -> bool {
        self.extended_state.is_some()
    }

    /// Returns the saved extended state, if any.
    pub fn extended_state(&self) -> Option<&A::ExtendedState> {
        self.extended_state.as_deref()
    }

    /// Returns the cached wide thread pointer.
    pub fn thread_pointer(&self) -> WideThreadPointer {
        self.thread_pointer
    }

    /// Sets the wide thread pointer (thread creation, `set_thread_area`).
    pub fn set_thread_pointer(&mut self, value: WideThreadPointer) {
        self.thread_pointer = value;
    }

    /// Releases the extended-state buffer during termination.
    ///
    /// The ownership flag is left alone: if the thread still owns the FPU,
    /// the next switch away from it clears ownership and finds no buffer to
    /// save into, which is the tolerated case of the release protocol.
    ///
    /// # Panics
    ///
    /// Panics unless the thread is Terminating or Terminated.
    pub fn release_extended_state(&mut self) -> Option<Box<A::ExtendedState>> {
        if !matches!(self.state, ThreadState::Terminating | ThreadState::Terminated) {
            kpanic!(
                "thread {}: extended state released while {}",
                self.id,
                self.state
            );
        }
        self.extended_state.take()
    }

    pub(crate) fn context_mut_ptr(&mut self) -> *mut A::Context {
        &raw mut self.context
    }

    pub(crate) fn context_ptr(&self) -> *const A::Context {
        &raw const self.context
    }

    pub(crate) fn extended_state_mut(&mut self) -> Option<&mut A::ExtendedState> {
        self.extended_state.as_deref_mut()
    }

    pub(crate) fn install_extended_state(&mut self, state: Box<A::ExtendedState>) {
        self.extended_state = Some(state);
    }

    pub(crate) fn mark_uses_extended_state(&mut self) {
        self.uses_extended_state = true;
    }

    pub(crate) fn set_extended_state_owner(&mut self, owner: bool) {
        self.extended_state_owner = owner;
    }

    pub(crate) fn cache_thread_pointer_high(&mut self, high: u32) {
        self.thread_pointer.set_high(high);
    }
}

impl<A: Arch> fmt::Debug for Thread<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.meta.name)
            .field("state", &self.state)
            .field("uses_extended_state", &self.uses_extended_state)
            .field("extended_state_owner", &self.extended_state_owner)
            .field("has_extended_state", &self.extended_state.is_some())
            .field("thread_pointer", &self.thread_pointer)
            .finish_non_exhaustive()
    }
}
