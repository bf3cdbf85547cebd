//! Caller-facing scheduler errors.
//!
//! Broken invariants of the switch path are fatal and never surface here;
//! these are requests a caller can get wrong and recover from.

use core::fmt;

use meridian_core::id::ThreadId;

use crate::thread::ThreadState;

/// Error returned by [`Dispatcher`](crate::dispatch::Dispatcher) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// No thread with this id exists on the processor.
    UnknownThread(ThreadId),
    /// The thread is not in a state the request can move it out of.
    InvalidTransition {
        /// Thread the request named.
        thread: ThreadId,
        /// State it was found in.
        from: ThreadState,
        /// State the request asked for.
        to: ThreadState,
    },
    /// The idle thread cannot block or exit.
    IdleThread,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownThread(id) => write!(f, "no thread {id} on this processor"),
            Self::InvalidTransition { thread, from, to } => {
                write!(f, "thread {thread} cannot move from {from} to {to}")
            }
            Self::IdleThread => write!(f, "operation not permitted on the idle thread"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_thread() {
        let id = ThreadId::new(7);
        assert_eq!(
            SchedError::UnknownThread(id).to_string(),
            "no thread 7 on this processor"
        );
        assert_eq!(
            SchedError::InvalidTransition {
                thread: id,
                from: ThreadState::Ready,
                to: ThreadState::Ready,
            }
            .to_string(),
            "thread 7 cannot move from ready to ready"
        );
    }
}
