//! Per-processor ready queues.
//!
//! One FIFO per priority tier. [`ReadyQueues::select`] always yields a
//! thread: when every tier is empty the processor's idle thread runs, so
//! the idle thread itself is never queued. Threads never leave the queue of
//! the processor they were made ready on.

extern crate alloc;

use alloc::collections::VecDeque;

use meridian_core::id::ThreadId;

use crate::thread::Priority;

/// Normal selections a waiting Background thread can be passed over for
/// before it is given one turn.
const BACKGROUND_GRACE: u32 = 32;

/// Priority-aware ready queues with an idle fallback.
pub struct ReadyQueues {
    tiers: [VecDeque<ThreadId>; Priority::COUNT],
    idle: ThreadId,
    /// Normal selections made since Background last ran while it waited.
    background_passed_over: u32,
}

impl ReadyQueues {
    /// Creates empty queues that fall back to `idle`.
    pub fn new(idle: ThreadId) -> Self {
        Self {
            tiers: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            idle,
            background_passed_over: 0,
        }
    }

    /// Appends a thread to the queue of its tier. Queuing the idle thread
    /// does nothing.
    pub fn push(&mut self, priority: Priority, id: ThreadId) {
        if id != self.idle {
            self.tiers[priority as usize].push_back(id);
        }
    }

    /// Removes and returns the thread that should run next, or the idle
    /// thread if none is ready.
    ///
    /// Critical threads always go first. Background runs only when Normal
    /// is empty, or once it has been passed over `BACKGROUND_GRACE` times
    /// in a row.
    pub fn select(&mut self) -> ThreadId {
        self.next_tier()
            .and_then(|tier| self.tiers[tier as usize].pop_front())
            .unwrap_or(self.idle)
    }

    /// Returns the number of queued threads across all tiers.
    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    /// Returns `true` if only the idle thread could run.
    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    fn waiting(&self, tier: Priority) -> bool {
        !self.tiers[tier as usize].is_empty()
    }

    fn next_tier(&mut self) -> Option<Priority> {
        if self.waiting(Priority::Critical) {
            return Some(Priority::Critical);
        }
        if !self.waiting(Priority::Background) {
            self.background_passed_over = 0;
            return self.waiting(Priority::Normal).then_some(Priority::Normal);
        }
        if !self.waiting(Priority::Normal) || self.background_passed_over >= BACKGROUND_GRACE {
            self.background_passed_over = 0;
            return Some(Priority::Background);
        }
        self.background_passed_over += 1;
        Some(Priority::Normal)
    }
}
