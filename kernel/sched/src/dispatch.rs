//! Per-processor dispatcher.
//!
//! The [`Dispatcher`] owns everything one processor schedules with: its
//! [`ProcessorBlock`], the idle thread, the thread table, the ready queues
//! and the trap table. Every operation that can change the running thread
//! raises to [`RunLevel::Dispatch`], picks the next thread and runs the
//! switch sequence of [`crate::switch`].
//!
//! The switch is finished by the thread that resumes, in
//! [`Dispatcher::complete_switch`]. That is also where a thread that exited
//! is reaped: by then it is off the processor and cannot be mid-switch.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicU64, Ordering};

use meridian_core::config::VERSION;
use meridian_core::id::{CpuId, ThreadId};
use meridian_core::runlevel::RunLevel;
use meridian_core::{kdebug, kpanic, ktrace};

use crate::arch::Arch;
use crate::error::SchedError;
use crate::fpu;
use crate::processor::ProcessorBlock;
use crate::queue::ReadyQueues;
use crate::switch;
use crate::thread::{Priority, Thread, ThreadMeta, ThreadState, WideThreadPointer};
use crate::trap::{TrapError, TrapHandler, TrapKind, TrapTable};

/// Thread ids are unique kernel-wide, not per processor.
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

fn allocate_thread_id() -> ThreadId {
    ThreadId::new(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
}

/// The switch currently being performed on a processor.
#[derive(Debug, Clone, Copy)]
struct Handoff {
    prev: ThreadId,
    next: ThreadId,
}

/// Scheduler state of one processor.
pub struct Dispatcher<A: Arch> {
    block: ProcessorBlock,
    arch: A,
    /// Boxed so records keep their address while the map changes.
    threads: BTreeMap<ThreadId, Box<Thread<A>>>,
    ready: ReadyQueues,
    traps: TrapTable<Self>,
    idle: ThreadId,
    in_flight: Option<Handoff>,
}

impl<A: Arch> Dispatcher<A> {
    /// Brings up the dispatcher of `cpu`, running its idle thread.
    ///
    /// The lazy FPU restore handler is registered for
    /// [`TrapKind::ExtendedStateUnavailable`].
    pub fn new(cpu: CpuId, arch: A) -> Self {
        let idle = allocate_thread_id();
        let meta = ThreadMeta::new("idle").with_priority(Priority::Background);
        let mut threads = BTreeMap::new();
        threads.insert(idle, Box::new(Thread::new_running(idle, meta)));

        let mut traps = TrapTable::new();
        traps
            .register(TrapKind::ExtendedStateUnavailable, Self::extended_state_trap)
            .unwrap_or_else(|err| kpanic!("cpu {}: {}", cpu, err));

        kdebug!("cpu {}: meridian {} dispatcher up, idle thread {}", cpu, VERSION, idle);
        Self {
            block: ProcessorBlock::new(cpu, idle),
            arch,
            threads,
            ready: ReadyQueues::new(idle),
            traps,
            idle,
            in_flight: None,
        }
    }

    /// Returns the processor block.
    pub fn block(&self) -> &ProcessorBlock {
        &self.block
    }

    /// Returns the architecture handle.
    pub fn arch(&self) -> &A {
        &self.arch
    }

    /// Returns the running thread.
    pub fn current(&self) -> ThreadId {
        self.block.current_thread()
    }

    /// Returns the idle thread.
    pub fn idle(&self) -> ThreadId {
        self.idle
    }

    /// Returns the record of `id`, if it lives on this processor.
    pub fn thread(&self, id: ThreadId) -> Option<&Thread<A>> {
        self.threads.get(&id).map(|t| &**t)
    }

    /// Returns the number of threads waiting to run.
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Creates a Ready thread and queues it.
    pub fn spawn(&mut self, meta: ThreadMeta) -> ThreadId {
        let id = allocate_thread_id();
        let level = self.block.run_level().raise(RunLevel::Dispatch);
        self.threads.insert(id, Box::new(Thread::new(id, meta)));
        self.ready.push(meta.priority, id);
        self.block.run_level().lower(level);
        ktrace!(
            "cpu {}: spawned thread {} ({}) priority={:?}",
            self.block.cpu(),
            id,
            meta.name,
            meta.priority
        );
        id
    }

    /// Sets the wide thread pointer of `id`.
    ///
    /// For the running thread both halves are loaded into their registers
    /// as well.
    ///
    /// # Errors
    ///
    /// Returns [`SchedError::UnknownThread`] if `id` is not on this processor.
    pub fn set_thread_pointer(&mut self, id: ThreadId, value: WideThreadPointer) -> Result<(), SchedError> {
        let thread = self.threads.get_mut(&id).ok_or(SchedError::UnknownThread(id))?;
        thread.set_thread_pointer(value);
        if id == self.block.current_thread() {
            self.arch.set_kernel_thread_pointer(value.low());
            self.arch.set_user_thread_pointer(value.high());
        }
        Ok(())
    }

    /// Gives up the processor to the next ready thread, if any.
    ///
    /// The running thread goes to the back of its tier. If nothing else is
    /// ready (or it outranks everything that is), it keeps running.
    pub fn yield_now(&mut self) {
        let level = self.block.run_level().raise(RunLevel::Dispatch);
        let current = self.block.current_thread();
        let thread = self.thread_mut(current);
        thread.set_state(ThreadState::Ready);
        let priority = thread.meta().priority;
        self.ready.push(priority, current);
        self.reschedule();
        self.block.run_level().lower(level);
    }

    /// Blocks the running thread until [`wake`](Self::wake).
    ///
    /// # Errors
    ///
    /// Returns [`SchedError::IdleThread`] if called on the idle thread.
    pub fn block_current(&mut self) -> Result<(), SchedError> {
        let current = self.block.current_thread();
        if current == self.idle {
            return Err(SchedError::IdleThread);
        }
        let level = self.block.run_level().raise(RunLevel::Dispatch);
        self.thread_mut(current).set_state(ThreadState::Blocked);
        self.reschedule();
        self.block.run_level().lower(level);
        Ok(())
    }

    /// Makes a blocked thread ready again.
    ///
    /// # Errors
    ///
    /// Returns [`SchedError::UnknownThread`] if `id` is not on this
    /// processor, or [`SchedError::InvalidTransition`] if it is not blocked.
    pub fn wake(&mut self, id: ThreadId) -> Result<(), SchedError> {
        let level = self.block.run_level().raise(RunLevel::Dispatch);
        let result = self.make_ready(id);
        self.block.run_level().lower(level);
        result
    }

    /// Terminates the running thread.
    ///
    /// Its extended-state buffer is released before the final switch away;
    /// the record itself is reaped by the next thread to run. On hardware
    /// this never returns to the exiting thread.
    ///
    /// # Errors
    ///
    /// Returns [`SchedError::IdleThread`] if called on the idle thread.
    pub fn exit_current(&mut self) -> Result<(), SchedError> {
        let current = self.block.current_thread();
        if current == self.idle {
            return Err(SchedError::IdleThread);
        }
        let level = self.block.run_level().raise(RunLevel::Dispatch);
        let thread = self.thread_mut(current);
        thread.set_state(ThreadState::Terminating);
        drop(thread.release_extended_state());
        kdebug!("cpu {}: thread {} exiting", self.block.cpu(), current);
        self.reschedule();
        self.block.run_level().lower(level);
        Ok(())
    }

    /// Runs the registered handler for a trap taken on this processor.
    ///
    /// # Errors
    ///
    /// Returns [`TrapError::NotRegistered`] if `kind` has no handler.
    pub fn trap(&mut self, kind: TrapKind) -> Result<(), TrapError> {
        let level = self.block.run_level().raise(RunLevel::Dispatch);
        let traps = self.traps;
        let result = traps.dispatch(kind, self);
        self.block.run_level().lower(level);
        result
    }

    /// Registers an additional trap handler.
    ///
    /// # Errors
    ///
    /// Returns [`TrapError::AlreadyRegistered`] if `kind` already has one.
    pub fn register_trap(&mut self, kind: TrapKind, handler: TrapHandler<Self>) -> Result<(), TrapError> {
        self.traps.register(kind, handler)
    }

    /// Removes the handler for `kind`.
    pub fn unregister_trap(&mut self, kind: TrapKind) -> Option<TrapHandler<Self>> {
        self.traps.unregister(kind)
    }

    /// Finishes the switch in flight on behalf of the thread that resumed.
    ///
    /// Called right after the swap primitive returns, and first thing by a
    /// new thread's entry trampoline. Reaps the previous thread if it was
    /// exiting.
    ///
    /// # Panics
    ///
    /// Panics if no switch is in flight.
    pub fn complete_switch(&mut self) {
        let Some(handoff) = self.in_flight.take() else {
            kpanic!("cpu {}: switch completed with none in flight", self.block.cpu());
        };
        let Some(resumed) = self.threads.get(&handoff.next) else {
            kpanic!("cpu {}: resumed thread {} has no record", self.block.cpu(), handoff.next);
        };
        switch::finish_switch(&self.block, resumed, &self.arch);

        let exiting = self
            .threads
            .get(&handoff.prev)
            .is_some_and(|t| t.state() == ThreadState::Terminating);
        if exiting {
            self.reap(handoff.prev);
        }
    }

    fn make_ready(&mut self, id: ThreadId) -> Result<(), SchedError> {
        let thread = self.threads.get_mut(&id).ok_or(SchedError::UnknownThread(id))?;
        if thread.state() != ThreadState::Blocked {
            return Err(SchedError::InvalidTransition {
                thread: id,
                from: thread.state(),
                to: ThreadState::Ready,
            });
        }
        thread.set_state(ThreadState::Ready);
        self.ready.push(thread.meta().priority, id);
        Ok(())
    }

    /// Switches from the running thread to the next ready one (or idle).
    ///
    /// The running thread's new state must already be set.
    fn reschedule(&mut self) {
        self.block
            .run_level()
            .require_at_least(RunLevel::Dispatch, self.arch.interrupts_enabled());

        let current = self.block.current_thread();
        let next = self.ready.select();
        self.thread_mut(next).set_state(ThreadState::Running);
        if next == current {
            return;
        }

        let Some((outgoing, incoming)) = pair_mut(&mut self.threads, current, next) else {
            kpanic!("cpu {}: switch {} -> {} without both records", self.block.cpu(), current, next);
        };
        switch::prepare_switch(&self.block, outgoing, incoming, &self.arch);
        let old = outgoing.context_mut_ptr();
        let new = incoming.context_ptr();

        self.in_flight = Some(Handoff { prev: current, next });
        // SAFETY: Both contexts live in boxed records that stay in the table
        // until reaped, and a record is reaped only after another thread
        // has resumed from it.
        unsafe { self.arch.swap_context(old, new) };
        self.complete_switch();
    }

    fn reap(&mut self, id: ThreadId) {
        let Some(mut thread) = self.threads.remove(&id) else {
            return;
        };
        drop(thread.release_extended_state());
        thread.set_state(ThreadState::Terminated);
        ktrace!("cpu {}: reaped thread {} ({})", self.block.cpu(), id, thread.meta().name);
    }

    fn extended_state_trap(&mut self) {
        let current = self.block.current_thread();
        let Some(thread) = self.threads.get_mut(&current) else {
            kpanic!("cpu {}: FPU trap for unknown thread {}", self.block.cpu(), current);
        };
        fpu::handle_extended_state_trap(&self.block, thread, &self.arch);
    }

    fn thread_mut(&mut self, id: ThreadId) -> &mut Thread<A> {
        match self.threads.get_mut(&id) {
            Some(thread) => &mut **thread,
            None => kpanic!("cpu {}: no record for thread {}", self.block.cpu(), id),
        }
    }
}

impl<A: Arch> core::fmt::Debug for Dispatcher<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("block", &self.block)
            .field("threads", &self.threads.len())
            .field("ready", &self.ready.len())
            .field("idle", &self.idle)
            .finish_non_exhaustive()
    }
}

/// Borrows the records of two distinct threads at once.
fn pair_mut<A: Arch>(
    threads: &mut BTreeMap<ThreadId, Box<Thread<A>>>,
    a: ThreadId,
    b: ThreadId,
) -> Option<(&mut Thread<A>, &mut Thread<A>)> {
    let mut first = None;
    let mut second = None;
    for (&id, thread) in threads.iter_mut() {
        if id == a {
            first = Some(&mut **thread);
        } else if id == b {
            second = Some(&mut **thread);
        }
    }
    Some((first?, second?))
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::test_arch::{ArchEvent, TestArch};

    fn dispatcher() -> Dispatcher<TestArch> {
        Dispatcher::new(CpuId::new(0), TestArch::new())
    }

    /// Executes one FPU instruction on the running thread that adds `delta`.
    fn add_fpu(d: &mut Dispatcher<TestArch>, delta: u64) {
        if !d.arch().extended_state_enabled() {
            d.trap(TrapKind::ExtendedStateUnavailable).unwrap();
        }
        let value = d.arch().fpu_value() + delta;
        assert!(d.arch().write_fpu(value));
    }

    fn saved_fpu(d: &Dispatcher<TestArch>, id: ThreadId) -> Option<u64> {
        d.thread(id)?.extended_state().map(|s| s.value)
    }

    #[test]
    fn starts_on_idle() {
        let d = dispatcher();
        assert_eq!(d.current(), d.idle());
        assert_eq!(d.thread(d.idle()).unwrap().state(), ThreadState::Running);
        assert_eq!(d.ready_len(), 0);
        assert_eq!(d.block().run_level().current(), RunLevel::Low);
    }

    #[test]
    fn yield_runs_spawned_thread() {
        let mut d = dispatcher();
        let t = d.spawn(ThreadMeta::new("worker"));
        assert_eq!(d.ready_len(), 1);

        d.yield_now();
        assert_eq!(d.current(), t);
        assert_eq!(d.thread(t).unwrap().state(), ThreadState::Running);
        assert_eq!(d.thread(d.idle()).unwrap().state(), ThreadState::Ready);
        assert_eq!(d.ready_len(), 0);
        assert_eq!(d.block().run_level().current(), RunLevel::Low);
    }

    #[test]
    fn yield_with_nothing_ready_keeps_running() {
        let mut d = dispatcher();
        let t = d.spawn(ThreadMeta::new("worker"));
        d.yield_now();
        d.arch().clear_events();

        d.yield_now();
        assert_eq!(d.current(), t);
        assert!(d.arch().events().is_empty());
    }

    #[test]
    fn round_robin_within_tier() {
        let mut d = dispatcher();
        let a = d.spawn(ThreadMeta::new("a"));
        let b = d.spawn(ThreadMeta::new("b"));

        d.yield_now();
        assert_eq!(d.current(), a);
        d.yield_now();
        assert_eq!(d.current(), b);
        d.yield_now();
        assert_eq!(d.current(), a);
    }

    #[test]
    fn critical_outranks_normal() {
        let mut d = dispatcher();
        let _normal = d.spawn(ThreadMeta::new("normal"));
        let critical = d.spawn(ThreadMeta::new("critical").with_priority(Priority::Critical));

        d.yield_now();
        assert_eq!(d.current(), critical);
        // Still outranks the waiting Normal thread.
        d.yield_now();
        assert_eq!(d.current(), critical);
    }

    #[test]
    fn thread_without_fpu_never_saves() {
        let mut d = dispatcher();
        let a = d.spawn(ThreadMeta::new("a"));
        let b = d.spawn(ThreadMeta::new("b"));
        for _ in 0..4 {
            d.yield_now();
        }

        assert_eq!(d.arch().count(|e| matches!(e, ArchEvent::Save(_) | ArchEvent::Disable)), 0);
        for id in [a, b] {
            let t = d.thread(id).unwrap();
            assert!(!t.uses_extended_state());
            assert!(!t.has_extended_state());
        }
    }

    #[test]
    fn fpu_state_follows_each_thread() {
        let mut d = dispatcher();
        let a = d.spawn(ThreadMeta::new("a"));
        let b = d.spawn(ThreadMeta::new("b"));

        d.yield_now();
        add_fpu(&mut d, 100);
        d.yield_now();
        add_fpu(&mut d, 200);
        d.yield_now();
        add_fpu(&mut d, 1);
        d.yield_now();

        assert_eq!(d.current(), b);
        assert_eq!(saved_fpu(&d, a), Some(101));
        assert_eq!(saved_fpu(&d, b), Some(200));
        assert_eq!(d.block().extended_state_owner(), None);
    }

    #[test]
    fn switch_without_fpu_use_saves_once() {
        let mut d = dispatcher();
        let _a = d.spawn(ThreadMeta::new("a"));
        let _b = d.spawn(ThreadMeta::new("b"));

        d.yield_now();
        add_fpu(&mut d, 1);
        // a: saved on the way out, then resumes and leaves without FPU use.
        d.yield_now();
        d.yield_now();
        d.yield_now();

        assert_eq!(d.arch().count(|e| matches!(e, ArchEvent::Save(_))), 1);
    }

    #[test]
    fn owner_is_always_current_thread() {
        let mut d = dispatcher();
        let a = d.spawn(ThreadMeta::new("a"));
        let _b = d.spawn(ThreadMeta::new("b"));

        d.yield_now();
        add_fpu(&mut d, 1);
        assert_eq!(d.block().extended_state_owner(), Some(a));
        d.yield_now();
        assert_eq!(d.block().extended_state_owner(), None);
        add_fpu(&mut d, 1);
        assert_eq!(d.block().extended_state_owner(), Some(d.current()));
    }

    #[test]
    fn block_and_wake() {
        let mut d = dispatcher();
        let t = d.spawn(ThreadMeta::new("waiter"));
        d.yield_now();

        d.block_current().unwrap();
        assert_eq!(d.current(), d.idle());
        assert_eq!(d.thread(t).unwrap().state(), ThreadState::Blocked);

        d.wake(t).unwrap();
        assert_eq!(d.thread(t).unwrap().state(), ThreadState::Ready);
        d.yield_now();
        assert_eq!(d.current(), t);
    }

    #[test]
    fn exiting_fpu_owner_is_reaped() {
        let mut d = dispatcher();
        let a = d.spawn(ThreadMeta::new("a"));
        let b = d.spawn(ThreadMeta::new("b"));
        d.yield_now();
        add_fpu(&mut d, 9);
        d.arch().clear_events();

        d.exit_current().unwrap();
        assert_eq!(d.current(), b);
        assert!(d.thread(a).is_none());
        assert_eq!(d.block().extended_state_owner(), None);
        assert!(!d.arch().extended_state_enabled());
        // Buffer was gone before the switch: nothing to save into.
        assert_eq!(d.arch().count(|e| matches!(e, ArchEvent::Save(_))), 0);
        assert_eq!(d.block().run_level().current(), RunLevel::Low);
    }

    #[test]
    fn exit_to_idle_when_nothing_ready() {
        let mut d = dispatcher();
        let t = d.spawn(ThreadMeta::new("last"));
        d.yield_now();

        d.exit_current().unwrap();
        assert_eq!(d.current(), d.idle());
        assert!(d.thread(t).is_none());
    }

    #[test]
    fn idle_cannot_block_or_exit() {
        let mut d = dispatcher();
        assert_eq!(d.block_current(), Err(SchedError::IdleThread));
        assert_eq!(d.exit_current(), Err(SchedError::IdleThread));
        assert_eq!(d.block().run_level().current(), RunLevel::Low);
    }

    #[test]
    fn wake_rejects_unknown_and_runnable() {
        let mut d = dispatcher();
        let t = d.spawn(ThreadMeta::new("t"));
        let ghost = ThreadId::new(u64::MAX);

        assert_eq!(d.wake(ghost), Err(SchedError::UnknownThread(ghost)));
        assert_eq!(
            d.wake(t),
            Err(SchedError::InvalidTransition {
                thread: t,
                from: ThreadState::Ready,
                to: ThreadState::Ready,
            })
        );
        assert_eq!(d.block().run_level().current(), RunLevel::Low);
    }

    #[test]
    fn thread_pointer_of_current_goes_to_register() {
        let mut d = dispatcher();
        let a = d.spawn(ThreadMeta::new("a"));
        d.set_thread_pointer(a, WideThreadPointer::new(0x0000_0007_0000_1000)).unwrap();
        d.yield_now();
        assert_eq!(d.arch().kernel_thread_pointer(), 0x1000);
        assert_eq!(d.arch().user_thread_pointer(), 7);

        d.set_thread_pointer(a, WideThreadPointer::new(0x0000_0008_0000_2000)).unwrap();
        assert_eq!(d.arch().kernel_thread_pointer(), 0x2000);
        assert_eq!(d.arch().user_thread_pointer(), 8);
        assert_eq!(
            d.set_thread_pointer(ThreadId::new(u64::MAX), WideThreadPointer::default()),
            Err(SchedError::UnknownThread(ThreadId::new(u64::MAX)))
        );
    }

    #[test]
    fn unregistered_trap_is_reported() {
        let mut d = dispatcher();
        assert_eq!(
            d.trap(TrapKind::ExtendedStateFault),
            Err(TrapError::NotRegistered(TrapKind::ExtendedStateFault))
        );
        assert_eq!(d.block().run_level().current(), RunLevel::Low);
    }

    #[test]
    fn registered_trap_handler_runs_at_dispatch() {
        fn check_level(d: &mut Dispatcher<TestArch>) {
            assert_eq!(d.block().run_level().current(), RunLevel::Dispatch);
            d.arch().user_writes_thread_pointer(0xF00D);
        }

        let mut d = dispatcher();
        d.register_trap(TrapKind::ExtendedStateFault, check_level).unwrap();
        assert_eq!(
            d.register_trap(TrapKind::ExtendedStateFault, check_level),
            Err(TrapError::AlreadyRegistered(TrapKind::ExtendedStateFault))
        );
        d.trap(TrapKind::ExtendedStateFault).unwrap();
        assert_eq!(d.arch().user_thread_pointer(), 0xF00D);

        assert!(d.unregister_trap(TrapKind::ExtendedStateFault).is_some());
    }

    #[test]
    #[should_panic(expected = "switch completed with none in flight")]
    fn stray_completion_is_fatal() {
        let mut d = dispatcher();
        d.complete_switch();
    }
}
