//! Condition variable.
//!
//! A condition variable lets a thread atomically release a lock and wait for
//! some state change announced by another thread. Wait and signal are both
//! done under the same lock; `cond_wait` returns with the lock held again.
//!
//! Signal moves the woken thread from the condition's queue onto the lock's
//! wait queue, so it regains the lock through the ordinary release handoff
//! rather than racing other acquirers while unlocked. Waiters queued on the
//! condition itself do not donate priority; donation starts once they are
//! contending for the lock.

use crate::sync::LockId;
use crate::util;
use crate::{Kernel, Port, ThreadId};
use alloc::collections::VecDeque;
use core::fmt;

/// Stable handle naming one condition variable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CondId(pub(crate) u64);

impl fmt::Display for CondId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cond{}", self.0)
    }
}

/// One waiting thread and the lock it must re-acquire on wakeup.
#[derive(Clone, Copy)]
pub(crate) struct CondWaiter {
    pub(crate) thread: ThreadId,
    pub(crate) lock: LockId,
}

pub(crate) struct Condvar {
    /// Waiting threads, ordered by descending effective priority.
    pub(crate) waiters: VecDeque<CondWaiter>,
}

impl<P: Port> Kernel<P> {
    /// Creates a condition variable.
    pub fn condvar(&mut self) -> CondId {
        let id = CondId(self.allocate_handle());
        self.conds.insert(
            id,
            Condvar {
                waiters: VecDeque::new(),
            },
        );
        id
    }

    /// Atomically releases `lock` and waits on `cond`; re-acquires `lock`
    /// before returning.
    ///
    /// The caller must hold `lock`. As ever with condition variables the
    /// awaited predicate must be re-checked in a loop: other threads may run
    /// between the signal and the return.
    pub fn cond_wait(&mut self, cond: CondId, lock: LockId) {
        assert!(!self.in_interrupt, "cond_wait from interrupt context");
        assert!(
            self.lock_held_by_current(lock),
            "cond_wait without holding the lock"
        );
        self.masked(|k| {
            let cur = k.current;
            log::trace!("{cur} waits on {cond}");
            k.cond_waiter_insert(cond, CondWaiter { thread: cur, lock });
            // The release and the block are one atomic step under masking,
            // so a signal cannot slip between them. No preemption check on
            // the release: the block's scheduling pass covers it.
            k.do_lock_release(lock, false);
            k.block();
            // cond_signal queued us on the lock; when we resume, the
            // signaler's release has already handed it over.
        });
    }

    /// Wakes the highest-priority waiter on `cond`, if any.
    ///
    /// The caller must hold the lock the waiter went to sleep with. The
    /// woken thread does not run with the predicate protected until it has
    /// re-acquired the lock.
    pub fn cond_signal(&mut self, cond: CondId) {
        self.masked(|k| {
            if let Some(waiter) = k.cond_take_waiter(cond) {
                k.wake_cond_waiter(waiter);
                k.maybe_preempt();
            }
        });
    }

    /// Wakes every waiter on `cond`, highest priority first.
    pub fn cond_broadcast(&mut self, cond: CondId) {
        self.masked(|k| {
            while let Some(waiter) = k.cond_take_waiter(cond) {
                k.wake_cond_waiter(waiter);
            }
            k.maybe_preempt();
        });
    }

    /// Number of threads waiting on `cond`.
    pub fn cond_waiter_count(&self, id: CondId) -> usize {
        self.cond(id).waiters.len()
    }

    /// Moves a signaled waiter onto its lock's wait queue. The lock is held
    /// by the signaler, so the waiter blocks on it and donates like any
    /// contender; the signaler's eventual release hands the lock over.
    fn wake_cond_waiter(&mut self, waiter: CondWaiter) {
        let CondWaiter { thread, lock } = waiter;
        let holder = self.lock_ref(lock).holder;
        assert_eq!(
            holder,
            Some(self.current),
            "condition signaled without the lock held"
        );
        let holder = self.current;
        log::trace!("{lock} re-contended by signaled {thread}");
        self.thread_mut(thread).waiting_lock = Some(lock);
        self.donator_insert(holder, thread);
        self.donate_chain(holder);
        self.lock_waiter_insert(lock, thread);
    }

    pub(crate) fn cond(&self, id: CondId) -> &Condvar {
        self.conds.get(&id).expect("unknown condition variable")
    }

    fn cond_mut(&mut self, id: CondId) -> &mut Condvar {
        self.conds.get_mut(&id).expect("unknown condition variable")
    }

    fn cond_waiter_insert(&mut self, id: CondId, waiter: CondWaiter) {
        let priority = self.thread(waiter.thread).priority;
        let pos = util::insertion_point(&self.cond(id).waiters, |w| {
            priority > self.thread(w.thread).priority
        });
        self.cond_mut(id).waiters.insert(pos, waiter);
    }

    /// Removes the highest-priority waiter, re-scanning because priorities
    /// may have changed since insertion.
    fn cond_take_waiter(&mut self, id: CondId) -> Option<CondWaiter> {
        let Kernel { threads, conds, .. } = self;
        let waiters = &mut conds
            .get_mut(&id)
            .expect("unknown condition variable")
            .waiters;
        util::take_highest_by(waiters, |w| {
            threads.get(&w.thread).expect("unknown thread id").priority
        })
    }
}
