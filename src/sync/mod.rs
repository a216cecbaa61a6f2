//! Synchronization primitives.
//!
//! Counting semaphores, mutual-exclusion locks with priority donation, and
//! condition variables, all built on the scheduler's block/unblock
//! operations and addressed by stable handles. Blocking operations are never
//! legal from interrupt context; [`Kernel::sema_up`] and the non-blocking
//! `try` variants are safe anywhere.
//!
//! [`Kernel::sema_up`]: crate::Kernel::sema_up

pub mod condvar;
pub(crate) mod donation;
pub mod mutex;
pub mod semaphore;

pub use condvar::CondId;
pub use mutex::LockId;
pub use semaphore::SemaId;

/// Returned by the non-blocking acquire variants when the resource is
/// unavailable and the caller would have to block to get it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WouldBlock;
