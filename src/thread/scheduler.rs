//! The scheduling decision.
//!
//! The ready queue is kept sorted by descending effective priority with FIFO
//! order among equals, so picking the next thread is popping the front. The
//! decision itself always runs with interrupts masked: it drains the
//! graveyard of threads that exited on earlier passes, selects the head of
//! the ready queue (or the idle thread), resets the time slice, and hands
//! off through the port's context-switch primitive.

use super::{Thread, ThreadId, ThreadState};
use crate::interrupt::InterruptState;
use crate::{Kernel, Port};

/// Ticks a thread may run before a yield is forced.
pub const TIME_SLICE: u32 = 4;

impl<P: Port> Kernel<P> {
    /// Inserts `tid` into the ready queue, before the first thread of
    /// strictly lower effective priority.
    pub(crate) fn ready_insert(&mut self, tid: ThreadId) {
        debug_assert!(!self.ready.contains(&tid), "thread already queued");
        debug_assert_ne!(tid, self.idle, "idle thread never enters the ready queue");
        let priority = self.thread(tid).priority;
        let pos = crate::util::insertion_point(&self.ready, |&t| priority > self.thread(t).priority);
        self.ready.insert(pos, tid);
    }

    /// The priority-preemption rule: if the ready queue's head has a
    /// strictly higher effective priority than the running thread, the
    /// running thread yields at once — or, from interrupt context, at the
    /// handler's return point.
    ///
    /// Run after any event that may have produced a new highest-priority
    /// runnable thread: thread creation, a priority change, a semaphore or
    /// lock wakeup. A no-op when the running thread is already on top.
    /// Callers hold interrupts masked.
    pub(crate) fn maybe_preempt(&mut self) {
        debug_assert_eq!(self.interrupt_state(), InterruptState::Off);
        let head = match self.ready.front() {
            Some(&tid) => tid,
            None => return,
        };
        if self.thread(head).priority > self.thread(self.current).priority {
            if self.in_interrupt {
                self.request_yield_on_return();
            } else {
                self.yield_now();
            }
        }
    }

    /// Moves the running thread into `status`, reclaims threads that died on
    /// earlier passes, and schedules.
    pub(crate) fn do_schedule(&mut self, status: ThreadState) {
        assert_eq!(self.interrupt_state(), InterruptState::Off);
        assert_eq!(self.thread(self.current).state, ThreadState::Running);
        while let Some(mut victim) = self.graveyard.pop_front() {
            log::debug!("reclaiming {} ({})", victim.tid, victim.name);
            if let Some(context) = victim.context.take() {
                self.port.destroy_context(context);
            }
        }
        self.thread_mut(self.current).state = status;
        self.schedule();
    }

    /// The scheduling decision proper.
    ///
    /// Picks the head of the ready queue (the idle thread if the queue is
    /// empty), marks it running, and if it differs from the outgoing thread
    /// performs the context switch. An outgoing dying thread parks in the
    /// graveyard; its storage is reclaimed by a later pass, once it no
    /// longer executes.
    pub(crate) fn schedule(&mut self) {
        assert_eq!(self.interrupt_state(), InterruptState::Off);
        let prev = self.current;
        assert_ne!(
            self.thread(prev).state,
            ThreadState::Running,
            "schedule() for a thread that wants to keep running"
        );

        let next = self.ready.pop_front().unwrap_or(self.idle);
        self.thread_mut(next).state = ThreadState::Running;
        self.slice_ticks = 0;
        self.port.activate(next);

        if prev == next {
            return;
        }
        log::trace!(
            "switch {prev} -> {next} ({})",
            self.thread(next).name
        );

        // The boot thread's storage was never allocated from the port, so
        // its record is simply left behind when it dies.
        let dying = self.thread(prev).state == ThreadState::Dying && prev != self.initial;
        if dying {
            let record = self.threads.remove(&prev).expect("unknown thread id");
            self.graveyard.push_back(record);
        }

        let mut prev_ctx = self
            .prev_record_mut(prev, dying)
            .context
            .take()
            .expect("outgoing thread has no context");
        self.current = next;
        {
            let Kernel { port, threads, .. } = self;
            let next_ctx = threads
                .get_mut(&next)
                .expect("unknown thread id")
                .context
                .as_mut()
                .expect("incoming thread has no context");
            // On a real port this call returns only when `prev` is next
            // scheduled; a simulated port records the handoff and returns.
            port.switch(&mut prev_ctx, next_ctx);
        }
        self.prev_record_mut(prev, dying).context = Some(prev_ctx);
    }

    fn prev_record_mut(&mut self, prev: ThreadId, dying: bool) -> &mut Thread<P> {
        if dying {
            self.graveyard
                .iter_mut()
                .rev()
                .find(|t| t.tid == prev)
                .expect("dying thread not in graveyard")
        } else {
            self.thread_mut(prev)
        }
    }
}
