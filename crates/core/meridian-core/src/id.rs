//! Type-safe identifiers for kernel resources.
//!
//! These newtypes prevent accidental mixing of thread and processor
//! identifiers at compile time.

use core::fmt;
use core::num::NonZeroU64;

/// CPU identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CpuId(u32);

impl CpuId {
    /// Creates a new `CpuId`.
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the value as `usize` (convenience for indexing).
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier.
///
/// Never zero, so `Option<ThreadId>` packs into a single word and a raw
/// zero can stand for "no thread" in atomic slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ThreadId(NonZeroU64);

impl ThreadId {
    /// Creates a new `ThreadId`.
    ///
    /// # Panics
    ///
    /// Panics if `val` is zero.
    pub const fn new(val: u64) -> Self {
        match NonZeroU64::new(val) {
            Some(v) => Self(v),
            None => panic!("thread id 0 is reserved"),
        }
    }

    /// Creates a `ThreadId` from a raw value, returning `None` for zero.
    pub const fn from_raw(val: u64) -> Option<Self> {
        match NonZeroU64::new(val) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns the raw `u64` value.
    pub const fn as_u64(self) -> u64 {
        self.0.get()
    }

    /// Encodes an optional id as a raw value (zero for `None`).
    pub const fn to_raw(id: Option<Self>) -> u64 {
        match id {
            Some(id) => id.as_u64(),
            None => 0,
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
