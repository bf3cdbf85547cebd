//! Trap handler registration.
//!
//! Handlers are plain function pointers registered per [`TrapKind`] on an
//! explicit table, so which code runs for a trap is decided at bring-up
//! rather than by link order. `C` is the context handed to the handler,
//! normally the processor's [`Dispatcher`](crate::dispatch::Dispatcher).

use core::fmt;

/// Trap sources routed through a [`TrapTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapKind {
    /// An FPU/vector instruction executed with direct access disabled.
    ExtendedStateUnavailable,
    /// The FPU raised a floating-point exception (trapped IEEE condition).
    ExtendedStateFault,
}

impl TrapKind {
    /// Number of trap kinds.
    pub const COUNT: usize = 2;

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtendedStateUnavailable => write!(f, "extended state unavailable"),
            Self::ExtendedStateFault => write!(f, "extended state fault"),
        }
    }
}

/// Error type for trap registration and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapError {
    /// A handler is already registered for this kind.
    AlreadyRegistered(TrapKind),
    /// No handler is registered for this kind.
    NotRegistered(TrapKind),
}

impl fmt::Display for TrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered(kind) => write!(f, "handler already registered for {kind}"),
            Self::NotRegistered(kind) => write!(f, "no handler registered for {kind}"),
        }
    }
}

/// Handler function signature: receives the table's context.
pub type TrapHandler<C> = fn(&mut C);

/// One handler slot per trap kind.
pub struct TrapTable<C> {
    handlers: [Option<TrapHandler<C>>; TrapKind::COUNT],
}

impl<C> TrapTable<C> {
    /// Creates a table with no handlers.
    pub const fn new() -> Self {
        Self {
            handlers: [None; TrapKind::COUNT],
        }
    }

    /// Registers `handler` for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`TrapError::AlreadyRegistered`] if `kind` already has one.
    pub fn register(&mut self, kind: TrapKind, handler: TrapHandler<C>) -> Result<(), TrapError> {
        let slot = &mut self.handlers[kind.index()];
        if slot.is_some() {
            return Err(TrapError::AlreadyRegistered(kind));
        }
        *slot = Some(handler);
        Ok(())
    }

    /// Removes and returns the handler for `kind`.
    pub fn unregister(&mut self, kind: TrapKind) -> Option<TrapHandler<C>> {
        self.handlers[kind.index()].take()
    }

    /// Returns `true` if `kind` has a handler.
    pub fn is_registered(&self, kind: TrapKind) -> bool {
        self.handlers[kind.index()].is_some()
    }

    /// Runs the handler for `kind` on `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`TrapError::NotRegistered`] if `kind` has no handler.
    pub fn dispatch(&self, kind: TrapKind, ctx: &mut C) -> Result<(), TrapError> {
        let handler = self.handlers[kind.index()].ok_or(TrapError::NotRegistered(kind))?;
        handler(ctx);
        Ok(())
    }
}

impl<C> Default for TrapTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual impls: function pointers are Copy whatever `C` is.
impl<C> Clone for TrapTable<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for TrapTable<C> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn bump(count: &mut u32) {
        *count += 1;
    }

    fn bump_twice(count: &mut u32) {
        *count += 2;
    }

    #[test]
    fn dispatch_runs_registered_handler() {
        let mut table = TrapTable::<u32>::new();
        table.register(TrapKind::ExtendedStateUnavailable, bump).unwrap();

        let mut count = 0;
        table.dispatch(TrapKind::ExtendedStateUnavailable, &mut count).unwrap();
        table.dispatch(TrapKind::ExtendedStateUnavailable, &mut count).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn unregistered_kind_is_an_error() {
        let table = TrapTable::<u32>::new();
        let mut count = 0;
        assert_eq!(
            table.dispatch(TrapKind::ExtendedStateFault, &mut count),
            Err(TrapError::NotRegistered(TrapKind::ExtendedStateFault))
        );
        assert_eq!(count, 0);
    }

    #[test]
    fn double_registration_rejected() {
        let mut table = TrapTable::<u32>::new();
        table.register(TrapKind::ExtendedStateFault, bump).unwrap();
        assert_eq!(
            table.register(TrapKind::ExtendedStateFault, bump_twice),
            Err(TrapError::AlreadyRegistered(TrapKind::ExtendedStateFault))
        );

        // The first handler stays in place.
        let mut count = 0;
        table.dispatch(TrapKind::ExtendedStateFault, &mut count).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn unregister_frees_the_slot() {
        let mut table = TrapTable::<u32>::new();
        table.register(TrapKind::ExtendedStateFault, bump).unwrap();
        assert!(table.unregister(TrapKind::ExtendedStateFault).is_some());
        assert!(!table.is_registered(TrapKind::ExtendedStateFault));
        assert!(table.unregister(TrapKind::ExtendedStateFault).is_none());
        table.register(TrapKind::ExtendedStateFault, bump_twice).unwrap();

        let mut count = 0;
        table.dispatch(TrapKind::ExtendedStateFault, &mut count).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn kinds_are_independent() {
        let mut table = TrapTable::<u32>::new();
        table.register(TrapKind::ExtendedStateUnavailable, bump).unwrap();
        assert!(table.is_registered(TrapKind::ExtendedStateUnavailable));
        assert!(!table.is_registered(TrapKind::ExtendedStateFault));
    }
}
