//! Counting semaphore.
//!
//! A semaphore holds a non-negative count of permits and a waiter queue
//! ordered by descending effective priority with FIFO tie-break. `down`
//! takes a permit or blocks; `up` returns one, waking the highest-priority
//! waiter if there is one.
//!
//! Wakeup uses direct handoff: when `up` finds a waiter, the permit passes
//! straight to it and the count is left untouched, so the woken thread's
//! `down` is already complete when it resumes. Observable behavior is the
//! same as incrementing and letting the waiter re-decrement.

use crate::sync::WouldBlock;
use crate::util;
use crate::{Kernel, Port, ThreadId};
use alloc::collections::VecDeque;
use core::fmt;

/// Stable handle naming one semaphore.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SemaId(pub(crate) u64);

impl fmt::Display for SemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sema{}", self.0)
    }
}

pub(crate) struct Semaphore {
    pub(crate) value: u32,
    /// Blocked threads, ordered by descending effective priority.
    pub(crate) waiters: VecDeque<ThreadId>,
}

impl<P: Port> Kernel<P> {
    /// Creates a semaphore with `value` initial permits.
    pub fn semaphore(&mut self, value: u32) -> SemaId {
        let id = SemaId(self.allocate_handle());
        self.semas.insert(
            id,
            Semaphore {
                value,
                waiters: VecDeque::new(),
            },
        );
        id
    }

    /// Takes a permit, blocking until one is available.
    ///
    /// Not callable from interrupt context. The check-and-block runs under
    /// masking so a wakeup cannot be lost between the check and the block.
    pub fn sema_down(&mut self, id: SemaId) {
        assert!(!self.in_interrupt, "sema_down from interrupt context");
        self.masked(|k| {
            if k.sema(id).value > 0 {
                k.sema_mut(id).value -= 1;
                return;
            }
            let cur = k.current;
            log::trace!("{cur} waits on {id}");
            k.sema_waiter_insert(id, cur);
            k.block();
            // The permit was handed to us directly by sema_up.
        });
    }

    /// Takes a permit only if one is available right now.
    pub fn sema_try_down(&mut self, id: SemaId) -> Result<(), WouldBlock> {
        self.masked(|k| {
            if k.sema(id).value > 0 {
                k.sema_mut(id).value -= 1;
                Ok(())
            } else {
                Err(WouldBlock)
            }
        })
    }

    /// Returns a permit, waking the highest-priority waiter if any, then
    /// runs the preemption check. Callable from interrupt context.
    pub fn sema_up(&mut self, id: SemaId) {
        self.masked(|k| {
            match k.sema_take_waiter(id) {
                Some(waiter) => {
                    log::trace!("{id} wakes {waiter}");
                    // Direct handoff: the count stays put.
                    k.unblock(waiter);
                }
                None => k.sema_mut(id).value += 1,
            }
            k.maybe_preempt();
        });
    }

    /// Current permit count; waiters block while it is zero.
    pub fn sema_value(&self, id: SemaId) -> u32 {
        self.sema(id).value
    }

    pub(crate) fn sema(&self, id: SemaId) -> &Semaphore {
        self.semas.get(&id).expect("unknown semaphore")
    }

    pub(crate) fn sema_mut(&mut self, id: SemaId) -> &mut Semaphore {
        self.semas.get_mut(&id).expect("unknown semaphore")
    }

    fn sema_waiter_insert(&mut self, id: SemaId, tid: ThreadId) {
        let priority = self.thread(tid).priority;
        let pos = util::insertion_point(&self.sema(id).waiters, |&t| {
            priority > self.thread(t).priority
        });
        self.sema_mut(id).waiters.insert(pos, tid);
    }

    /// Removes the highest-priority waiter, re-scanning because donation may
    /// have raised a waiter's priority after it was queued.
    fn sema_take_waiter(&mut self, id: SemaId) -> Option<ThreadId> {
        let Kernel { threads, semas, .. } = self;
        let waiters = &mut semas.get_mut(&id).expect("unknown semaphore").waiters;
        util::take_highest_by(waiters, |t| {
            threads.get(t).expect("unknown thread id").priority
        })
    }
}
