//! Interrupt-level model and masked critical sections.
//!
//! On this single CPU the only mutual-exclusion discipline the core needs is
//! "disable interrupts for the duration of a critical section": masking
//! already gives mutual exclusion over the ready queue, the sleep queue and
//! every donation field. [`Kernel::masked`] is the scoped form of that
//! discipline — it records the prior interrupt level and restores it on the
//! way out, so no critical section is ever left open on an early return.
//!
//! Interrupt *delivery* is modeled by [`Kernel::external_interrupt`]: the
//! platform wraps each hardware interrupt handler in it. Handlers may unblock
//! threads and signal semaphores, but they never block, and a context switch
//! requested from a handler is deferred to the return point rather than
//! performed inside the handler.

use crate::{Kernel, Port};

/// The interrupt level of the CPU.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptState {
    /// Interrupts are enabled.
    On,
    /// Interrupts are disabled.
    Off,
}

impl<P: Port> Kernel<P> {
    /// Reads the current interrupt level.
    pub fn interrupt_state(&self) -> InterruptState {
        if self.intr_on {
            InterruptState::On
        } else {
            InterruptState::Off
        }
    }

    /// Returns whether the CPU is currently running an interrupt handler.
    pub fn in_interrupt_context(&self) -> bool {
        self.in_interrupt
    }

    /// Disables interrupts and returns the previous level.
    pub(crate) fn intr_disable(&mut self) -> InterruptState {
        let prev = self.interrupt_state();
        self.intr_on = false;
        prev
    }

    /// Restores a previously saved interrupt level.
    pub(crate) fn intr_set_level(&mut self, level: InterruptState) {
        self.intr_on = level == InterruptState::On;
    }

    /// Runs `f` as a masked critical section.
    ///
    /// The prior interrupt level is restored on exit regardless of how `f`
    /// returns. Sections nest: an inner section saves `Off` and restores
    /// `Off`, so only the outermost one re-enables interrupts.
    pub(crate) fn masked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let prev = self.intr_disable();
        let r = f(self);
        self.intr_set_level(prev);
        r
    }

    /// Requests that the running thread yield once the current interrupt
    /// handler returns. Switching contexts while handler state is still in
    /// use is not allowed, so the yield is deferred to the return point.
    pub(crate) fn request_yield_on_return(&mut self) {
        debug_assert!(self.in_interrupt);
        self.yield_pending = true;
    }

    /// Delivers an external (hardware) interrupt, running `handler` in
    /// interrupt context.
    ///
    /// Interrupts are masked for the duration of the handler. If the handler
    /// made a higher-priority thread runnable or exhausted the running
    /// thread's time slice, the resulting yield happens here, at the return
    /// point, after the handler has finished.
    ///
    /// # Panics
    ///
    /// Panics if called while interrupts are masked (hardware would hold the
    /// interrupt pending instead) or from within another handler.
    pub fn external_interrupt<R>(&mut self, handler: impl FnOnce(&mut Self) -> R) -> R {
        assert!(
            self.intr_on,
            "interrupt delivered while interrupts are masked"
        );
        assert!(!self.in_interrupt, "nested external interrupt");
        let saved = self.intr_disable();
        self.in_interrupt = true;
        let r = handler(self);
        self.in_interrupt = false;
        self.intr_set_level(saved);
        if self.yield_pending {
            self.yield_pending = false;
            self.yield_now();
        }
        r
    }
}
