//! Thread abstraction and lifecycle.
//!
//! A thread is one schedulable execution context. Its lifecycle is
//! `Blocked` at creation → `Ready` once unblocked → `Running` when the
//! scheduler picks it → back to `Ready` on a yield, `Blocked` on a wait, or
//! `Dying` on exit. A dying thread's storage is reclaimed only after the
//! scheduler has switched away from it: a thread cannot free its own
//! execution context while still using it, so the record parks in a
//! graveyard queue that the next scheduling pass drains.
//!
//! Threads are addressed by [`ThreadId`], a stable handle into the kernel's
//! thread arena. Ids are monotonically increasing and never reused, so a
//! stale handle can be detected rather than silently aliasing a new thread.

pub mod scheduler;

use crate::sync::LockId;
use crate::{Kernel, KernelError, Port};
use arrayvec::ArrayString;
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use core::fmt;

/// A scheduling priority. Higher values run first.
pub type Priority = u8;

/// Lowest priority; reserved in practice for the idle thread.
pub const PRI_MIN: Priority = 0;
/// Priority of the boot thread and the default for new threads.
pub const PRI_DEFAULT: Priority = 31;
/// Highest priority.
pub const PRI_MAX: Priority = 63;

/// Maximum thread-name length; longer names are truncated. Names exist for
/// debugging only.
pub const NAME_MAX: usize = 16;

/// Stable handle naming one thread.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ThreadId(pub(crate) u64);

impl ThreadId {
    /// Placeholder used while the kernel value is under construction.
    pub(crate) const BOOTSTRAP: ThreadId = ThreadId(0);
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid{}", self.0)
    }
}

/// A possible state of a thread.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadState {
    /// Chosen by the scheduler; exactly one thread is `Running` at any
    /// instant on this CPU.
    Running,
    /// Runnable and queued in the ready queue.
    Ready,
    /// Waiting for an event: a semaphore, a lock, a condition variable or a
    /// timer wakeup.
    Blocked,
    /// Exited; storage awaits deferred reclamation.
    Dying,
}

/// One thread's record in the kernel arena.
pub(crate) struct Thread<P: Port> {
    pub(crate) tid: ThreadId,
    pub(crate) name: ArrayString<NAME_MAX>,
    pub(crate) state: ThreadState,

    /// Effective priority: the value scheduling decisions use. Always
    /// `max(original_priority, donated priorities)`.
    pub(crate) priority: Priority,
    /// The priority last set explicitly by the thread or its creator.
    pub(crate) original_priority: Priority,
    /// Threads currently waiting on a lock this thread holds, ordered by
    /// descending effective priority. Each donor floors this thread's
    /// effective priority at its own.
    pub(crate) donators: VecDeque<ThreadId>,
    /// The single lock this thread is blocked on, if any. A thread blocks on
    /// at most one lock at a time, which keeps the wait-for relation a
    /// forest.
    pub(crate) waiting_lock: Option<LockId>,

    /// Absolute tick at which to wake; meaningful only while the thread is
    /// in the sleep queue.
    pub(crate) wakeup_tick: i64,

    /// Opaque saved execution state, lent to the port during a switch.
    pub(crate) context: Option<P::Context>,
}

impl<P: Port> Thread<P> {
    pub(crate) fn new(
        tid: ThreadId,
        name: &str,
        priority: Priority,
        context: P::Context,
    ) -> Self {
        Thread {
            tid,
            name: bounded_name(name),
            state: ThreadState::Blocked,
            priority,
            original_priority: priority,
            donators: VecDeque::new(),
            waiting_lock: None,
            wakeup_tick: 0,
            context: Some(context),
        }
    }
}

fn bounded_name(name: &str) -> ArrayString<NAME_MAX> {
    let mut bounded = ArrayString::new();
    for c in name.chars() {
        if bounded.try_push(c).is_err() {
            break;
        }
    }
    bounded
}

impl<P: Port> Kernel<P> {
    /// Creates a new thread named `name` with the given priority, running
    /// `entry` when first scheduled, and makes it runnable.
    ///
    /// The new thread may preempt the caller immediately if its priority is
    /// strictly higher. Returns the new thread's id, or
    /// [`KernelError::NoMemory`] if the port cannot back another execution
    /// context; no id is ever handed out for a thread that failed to
    /// allocate.
    ///
    /// # Panics
    ///
    /// Panics if `priority` exceeds [`PRI_MAX`].
    pub fn spawn<F>(
        &mut self,
        name: &str,
        priority: Priority,
        entry: F,
    ) -> Result<ThreadId, KernelError>
    where
        F: FnOnce() + Send + 'static,
    {
        assert!(priority <= PRI_MAX, "priority {priority} out of range");
        let context = self.port.create_context(Box::new(entry))?;
        let tid = self.allocate_tid();
        let thread = Thread::new(tid, name, priority, context);
        log::debug!("spawn {tid} ({name}) at priority {priority}");
        self.threads.insert(tid, thread);
        self.unblock(tid);
        self.masked(|k| k.maybe_preempt());
        Ok(tid)
    }

    /// The id of the running thread.
    pub fn current(&self) -> ThreadId {
        self.current
    }

    /// The running thread's name.
    pub fn thread_name(&self) -> &str {
        &self.thread(self.current).name
    }

    /// The running thread's effective priority.
    pub fn priority(&self) -> Priority {
        self.thread(self.current).priority
    }

    /// Looks up a thread's state by id.
    pub fn get_state(&self, tid: ThreadId) -> Option<ThreadState> {
        self.threads.get(&tid).map(|t| t.state)
    }

    /// Looks up a thread's effective priority by id.
    pub fn get_priority(&self, tid: ThreadId) -> Option<Priority> {
        self.threads.get(&tid).map(|t| t.priority)
    }

    /// Puts the running thread to sleep until [`unblock`]ed.
    ///
    /// Callable only with interrupts masked and never from interrupt
    /// context. The caller resumes only after some other context unblocks
    /// it.
    ///
    /// [`unblock`]: Kernel::unblock
    pub(crate) fn block(&mut self) {
        assert!(!self.in_interrupt, "block() from interrupt context");
        assert_eq!(
            self.interrupt_state(),
            crate::interrupt::InterruptState::Off,
            "block() with interrupts enabled"
        );
        let cur = self.current;
        self.thread_mut(cur).state = ThreadState::Blocked;
        self.schedule();
    }

    /// Transitions a blocked thread to ready and queues it for scheduling.
    ///
    /// Deliberately performs no preemption check: callers that need one run
    /// it themselves, which lets a batch of unblocks happen atomically
    /// before a single preemption decision. Callable from interrupt
    /// context.
    ///
    /// # Panics
    ///
    /// Panics if the target is not blocked.
    pub fn unblock(&mut self, tid: ThreadId) {
        self.masked(|k| {
            let thread = k.thread_mut(tid);
            assert_eq!(
                thread.state,
                ThreadState::Blocked,
                "unblock of a thread that is not blocked"
            );
            thread.state = ThreadState::Ready;
            k.ready_insert(tid);
        });
    }

    /// Cedes the CPU. The caller stays runnable and is re-queued behind
    /// equal-priority threads; it may be re-picked immediately if it is
    /// still the highest-priority runnable thread.
    pub fn yield_now(&mut self) {
        assert!(!self.in_interrupt, "yield from interrupt context");
        self.masked(|k| {
            let cur = k.current;
            // The idle thread is never queued; schedule() falls back to it.
            if cur != k.idle {
                k.ready_insert(cur);
            }
            k.do_schedule(ThreadState::Ready);
        });
    }

    /// Sets the running thread's own (original) priority and recomputes its
    /// effective priority under the donation rule. If the thread no longer
    /// has the highest priority, it yields immediately.
    ///
    /// # Panics
    ///
    /// Panics if `priority` exceeds [`PRI_MAX`].
    pub fn set_priority(&mut self, priority: Priority) {
        assert!(priority <= PRI_MAX, "priority {priority} out of range");
        let cur = self.current;
        self.thread_mut(cur).original_priority = priority;
        self.refresh_priority(cur);
        self.masked(|k| k.maybe_preempt());
    }

    /// Terminates the running thread.
    ///
    /// The thread's storage is queued for deferred destruction and another
    /// thread is scheduled. On a real port control never returns to the
    /// exiting thread; under a simulated port the call site continues as
    /// the newly scheduled thread.
    pub fn exit(&mut self) {
        assert!(!self.in_interrupt, "exit from interrupt context");
        let cur = self.current;
        log::debug!("thread {cur} ({}) exiting", self.thread(cur).name);
        self.intr_disable();
        self.do_schedule(ThreadState::Dying);
        // Resuming a context restores its interrupt level; the execution
        // that continues past the switch runs with interrupts enabled.
        self.intr_on = true;
    }
}
