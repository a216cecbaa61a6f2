//! The platform seam.
//!
//! Everything architecture-specific sits behind the [`Port`] trait: storage
//! for execution contexts, the register-level context switch, the optional
//! address-space activation hook, and the raw hardware-timer poll. The rest
//! of the core never touches a register, which keeps it portable and lets a
//! test harness substitute a port that records a scheduler trace instead of
//! swapping stacks.

use crate::{KernelError, ThreadId};
use alloc::boxed::Box;

/// The body a new thread starts executing, with interrupts enabled. When it
/// returns, the thread exits.
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Architecture- and platform-specific collaborators of the concurrency
/// core.
///
/// One storage unit backs one thread's control state plus its private
/// execution stack; [`create_context`] and [`destroy_context`] are the
/// allocator for those units. [`switch`] is the opaque suspend-and-resume
/// primitive.
///
/// [`create_context`]: Port::create_context
/// [`destroy_context`]: Port::destroy_context
/// [`switch`]: Port::switch
pub trait Port {
    /// Saved register/stack state for one thread. Owned by the thread's
    /// record while it is not running; ownership transfers to the CPU while
    /// it runs.
    type Context;

    /// Captures the already-running boot execution as a context, so the boot
    /// code can become the "main" thread.
    fn bootstrap_context(&mut self) -> Self::Context;

    /// Allocates a zeroed storage unit and prepares a context that will run
    /// `entry` when first switched to.
    ///
    /// Fails with [`KernelError::NoMemory`] on storage exhaustion; this is
    /// the one recoverable failure in thread creation.
    fn create_context(&mut self, entry: ThreadEntry) -> Result<Self::Context, KernelError>;

    /// Returns a context's storage unit to the allocator. Called only after
    /// the scheduler has switched away from the owning thread for the last
    /// time.
    fn destroy_context(&mut self, context: Self::Context);

    /// Suspends the current execution into `prev` and resumes `next`.
    ///
    /// Invoked only with interrupts masked. On real hardware the caller does
    /// not return from this in the conventional sense: execution reappears
    /// at the call site when `prev`'s thread is next chosen to run. A
    /// simulated port may simply record the handoff and return.
    fn switch(&mut self, prev: &mut Self::Context, next: &mut Self::Context);

    /// Invoked by the scheduling decision for the incoming thread, letting
    /// an address-space subsystem install its mappings. Default: no-op, for
    /// builds without that subsystem.
    fn activate(&mut self, _tid: ThreadId) {}

    /// Polls the hardware timer: returns `true` if a tick interrupt is due.
    /// Used only by busy-wait loops (calibration and sub-tick delays), where
    /// the core spins with interrupts enabled and must still observe time.
    fn poll_tick(&mut self) -> bool {
        false
    }
}
