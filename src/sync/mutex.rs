//! Mutual-exclusion lock with priority donation.
//!
//! A lock is a binary semaphore that remembers its holder, which is what
//! makes donation possible: a blocked acquirer knows exactly which thread
//! stands in its way and can lend it its priority for the duration. Release
//! hands the lock directly to the highest-priority waiter and moves the
//! remaining waiters' donations over to the new holder.
//!
//! Locks are not recursive. A thread acquiring a lock it already holds, or
//! releasing one it does not, is a kernel bug and panics.

use crate::sync::WouldBlock;
use crate::util;
use crate::{Kernel, Port, ThreadId};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;

/// Stable handle naming one lock.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LockId(pub(crate) u64);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock{}", self.0)
    }
}

pub(crate) struct Lock {
    /// 1 when free, 0 when held.
    pub(crate) value: u32,
    pub(crate) holder: Option<ThreadId>,
    /// Blocked acquirers, ordered by descending effective priority.
    pub(crate) waiters: VecDeque<ThreadId>,
}

impl<P: Port> Kernel<P> {
    /// Creates a lock, initially free.
    pub fn lock(&mut self) -> LockId {
        let id = LockId(self.allocate_handle());
        self.locks.insert(
            id,
            Lock {
                value: 1,
                holder: None,
                waiters: VecDeque::new(),
            },
        );
        id
    }

    /// Acquires the lock, blocking until it is free.
    ///
    /// While blocked, the caller donates its effective priority to the
    /// holder, transitively through any chain of locks the holder is itself
    /// blocked on.
    ///
    /// # Panics
    ///
    /// Panics if the caller already holds the lock.
    pub fn lock_acquire(&mut self, id: LockId) {
        assert!(!self.in_interrupt, "lock_acquire from interrupt context");
        self.masked(|k| {
            let cur = k.current;
            assert_ne!(
                k.lock_ref(id).holder,
                Some(cur),
                "lock re-acquired by its holder"
            );
            if k.lock_ref(id).value > 0 {
                let lock = k.lock_mut(id);
                lock.value = 0;
                lock.holder = Some(cur);
                return;
            }
            let holder = k.lock_ref(id).holder.expect("held lock has no holder");
            log::trace!("{cur} blocks on {id} held by {holder}");
            k.thread_mut(cur).waiting_lock = Some(id);
            k.donator_insert(holder, cur);
            k.donate_chain(holder);
            k.lock_waiter_insert(id, cur);
            k.block();
            // The lock was handed to us by its previous holder's release.
        });
    }

    /// Acquires the lock only if it is free right now. Never donates.
    ///
    /// # Panics
    ///
    /// Panics if the caller already holds the lock.
    pub fn lock_try_acquire(&mut self, id: LockId) -> Result<(), WouldBlock> {
        self.masked(|k| {
            let cur = k.current;
            assert_ne!(
                k.lock_ref(id).holder,
                Some(cur),
                "lock re-acquired by its holder"
            );
            if k.lock_ref(id).value > 0 {
                let lock = k.lock_mut(id);
                lock.value = 0;
                lock.holder = Some(cur);
                Ok(())
            } else {
                Err(WouldBlock)
            }
        })
    }

    /// Releases the lock, reverting any priority donated through it and
    /// waking the highest-priority waiter as the new holder.
    ///
    /// # Panics
    ///
    /// Panics if the caller does not hold the lock.
    pub fn lock_release(&mut self, id: LockId) {
        self.masked(|k| k.do_lock_release(id, true));
    }

    /// `true` when the running thread holds the lock.
    pub fn lock_held_by_current(&self, id: LockId) -> bool {
        self.lock_ref(id).holder == Some(self.current)
    }

    /// The thread currently holding the lock, if any.
    pub fn lock_holder(&self, id: LockId) -> Option<ThreadId> {
        self.lock_ref(id).holder
    }

    /// Release body, shared with condition-variable wait. `check_preempt` is
    /// off when the caller is about to block anyway: the scheduling pass at
    /// the block covers the preemption decision.
    pub(crate) fn do_lock_release(&mut self, id: LockId, check_preempt: bool) {
        let cur = self.current;
        assert_eq!(
            self.lock_ref(id).holder,
            Some(cur),
            "lock released by a thread that does not hold it"
        );
        self.withdraw_donations(cur, id);
        self.lock_mut(id).holder = None;

        match self.lock_take_waiter(id) {
            Some(next) => {
                log::trace!("{id} handed from {cur} to {next}");
                // Direct handoff: `next` becomes the holder before it runs,
                // and the waiters still queued become its donators.
                self.thread_mut(next).waiting_lock = None;
                self.lock_mut(id).holder = Some(next);
                let remaining: Vec<ThreadId> =
                    self.lock_ref(id).waiters.iter().copied().collect();
                for waiter in remaining {
                    self.donator_insert(next, waiter);
                }
                self.refresh_priority(next);
                self.unblock(next);
            }
            None => self.lock_mut(id).value = 1,
        }
        if check_preempt {
            self.maybe_preempt();
        }
    }

    pub(crate) fn lock_ref(&self, id: LockId) -> &Lock {
        self.locks.get(&id).expect("unknown lock")
    }

    pub(crate) fn lock_mut(&mut self, id: LockId) -> &mut Lock {
        self.locks.get_mut(&id).expect("unknown lock")
    }

    pub(crate) fn lock_waiter_insert(&mut self, id: LockId, tid: ThreadId) {
        let priority = self.thread(tid).priority;
        let pos = util::insertion_point(&self.lock_ref(id).waiters, |&t| {
            priority > self.thread(t).priority
        });
        self.lock_mut(id).waiters.insert(pos, tid);
    }

    /// Removes the highest-priority waiter, re-scanning because donation may
    /// have reordered effective priorities since insertion.
    fn lock_take_waiter(&mut self, id: LockId) -> Option<ThreadId> {
        let Kernel { threads, locks, .. } = self;
        let waiters = &mut locks.get_mut(&id).expect("unknown lock").waiters;
        util::take_highest_by(waiters, |t| {
            threads.get(t).expect("unknown thread id").priority
        })
    }
}
