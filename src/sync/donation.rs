//! Priority donation.
//!
//! When a thread blocks on a lock whose holder has lower effective priority,
//! the holder would stall it indefinitely behind middle-priority threads.
//! Donation closes the inversion: each thread's effective priority is the
//! maximum of its own set priority and the effective priorities of the
//! threads waiting on locks it holds, propagated transitively along the
//! chain of lock holders.
//!
//! The wait-for relation is a forest (a thread blocks on at most one lock),
//! so the chain walk terminates without cycle detection.

use crate::sync::LockId;
use crate::{Kernel, Port, ThreadId};
use alloc::vec::Vec;

impl<P: Port> Kernel<P> {
    /// Recomputes `tid`'s effective priority from its own priority and its
    /// donators. Returns whether the value changed. A ready thread whose
    /// priority changed is repositioned in the ready queue.
    pub(crate) fn refresh_priority(&mut self, tid: ThreadId) -> bool {
        let donated = self
            .thread(tid)
            .donators
            .iter()
            .map(|&d| self.thread(d).priority)
            .max();
        let thread = self.thread(tid);
        let effective = match donated {
            Some(d) if d > thread.original_priority => d,
            _ => thread.original_priority,
        };
        if effective == thread.priority {
            return false;
        }
        self.thread_mut(tid).priority = effective;
        if self.get_state(tid) == Some(crate::ThreadState::Ready) {
            let pos = self
                .ready
                .iter()
                .position(|&t| t == tid)
                .expect("ready thread not in ready queue");
            self.ready.remove(pos);
            self.ready_insert(tid);
        }
        true
    }

    /// Propagates a donation along the chain of lock holders starting at
    /// `tid`: refresh the thread, and if it is itself blocked on a lock,
    /// reposition it among that holder's donators and continue with the
    /// holder. Stops when a refresh changes nothing or the chain ends at a
    /// runnable thread.
    pub(crate) fn donate_chain(&mut self, tid: ThreadId) {
        let mut at = tid;
        loop {
            let changed = self.refresh_priority(at);
            let lock = match self.thread(at).waiting_lock {
                Some(lock) if changed => lock,
                _ => break,
            };
            let holder = self.lock_ref(lock).holder.expect("held lock has no holder");
            self.donator_reposition(holder, at);
            at = holder;
        }
    }

    /// Records `donor` as donating to `holder`, keeping the donator queue in
    /// descending effective-priority order.
    pub(crate) fn donator_insert(&mut self, holder: ThreadId, donor: ThreadId) {
        debug_assert_ne!(holder, donor, "thread donating to itself");
        let priority = self.thread(donor).priority;
        let pos = crate::util::insertion_point(&self.thread(holder).donators, |&d| {
            priority > self.thread(d).priority
        });
        self.thread_mut(holder).donators.insert(pos, donor);
    }

    /// Re-sorts `donor` within `holder`'s donator queue after its effective
    /// priority changed.
    pub(crate) fn donator_reposition(&mut self, holder: ThreadId, donor: ThreadId) {
        let pos = self
            .thread(holder)
            .donators
            .iter()
            .position(|&d| d == donor)
            .expect("donor missing from holder's donators");
        self.thread_mut(holder).donators.remove(pos);
        self.donator_insert(holder, donor);
    }

    /// Drops every donation `tid` received through `lock` and recomputes its
    /// effective priority. Run when `tid` releases `lock`; donations through
    /// other locks it still holds survive.
    pub(crate) fn withdraw_donations(&mut self, tid: ThreadId, lock: LockId) {
        let donators: Vec<ThreadId> = self.thread(tid).donators.iter().copied().collect();
        let kept: Vec<ThreadId> = donators
            .into_iter()
            .filter(|&d| self.thread(d).waiting_lock != Some(lock))
            .collect();
        self.thread_mut(tid).donators = kept.into_iter().collect();
        self.refresh_priority(tid);
    }
}
