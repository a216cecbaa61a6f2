//! # Strand: the concurrency core of a small preemptible kernel.
//!
//! Strand implements the scheduling heart of a single-CPU kernel: a
//! priority-based thread scheduler with FIFO tie-break, a transitive
//! priority-donation protocol for locks, counting semaphores and condition
//! variables built on the scheduler's block/unblock operations, and a
//! tick-driven sleep/wakeup mechanism.
//!
//! ## The threading model
//!
//! A kernel built on this core consists of a collection of threads, each an
//! abstraction of the CPU. Exactly one thread is running at any instant;
//! every other thread is ready, blocked, or on its way to destruction. There
//! is no parallel execution, but interrupts can preempt the running thread at
//! any instruction boundary, so every mutation of scheduling state happens
//! inside a masked-interrupt critical section.
//!
//! All mutable scheduler state lives in a single [`Kernel`] value: the thread
//! arena, the ready queue, the sleep queue, the synchronization-object
//! arenas, and the tick counters. Threads, locks, semaphores and condition
//! variables are addressed by stable integer handles ([`ThreadId`],
//! [`LockId`], [`SemaId`], [`CondId`]) rather than by reference, so a record
//! can never dangle while another record still names it.
//!
//! The architecture-specific pieces are reached through the narrow
//! [`Port`] trait: execution-context allocation, the register-level context
//! switch, the optional address-space activation hook, and the hardware
//! timer poll used by busy-wait calibration. Everything else is portable.
//!
//! [`LockId`]: sync::LockId
//! [`SemaId`]: sync::SemaId
//! [`CondId`]: sync::CondId
#![no_std]

extern crate alloc;

pub mod interrupt;
pub mod port;
pub mod sync;
pub mod thread;
pub mod timer;
pub(crate) mod util;

pub use port::{Port, ThreadEntry};
pub use thread::{PRI_DEFAULT, PRI_MAX, PRI_MIN, Priority, ThreadId, ThreadState};

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use sync::condvar::Condvar;
use sync::mutex::Lock;
use sync::semaphore::Semaphore;
use sync::{CondId, LockId, SemaId};
use thread::Thread;

/// A recoverable kernel failure.
///
/// Programmer errors (releasing a lock that is not held, blocking from
/// interrupt context, an out-of-range priority) are not recoverable: they
/// indicate a broken invariant and halt the kernel with a panic. The one
/// failure the caller is expected to handle is storage exhaustion on thread
/// creation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KernelError {
    /// The storage allocator could not back a new execution context.
    NoMemory,
}

/// The kernel's concurrency core.
///
/// One `Kernel` value owns every piece of mutable scheduler state. Its
/// operations are spread across the component modules the state belongs to:
/// thread lifecycle in [`thread`], the scheduling decision in
/// [`thread::scheduler`], synchronization in [`sync`], tick accounting and
/// sleeping in [`timer`], and the masking discipline in [`interrupt`].
///
/// Construction converts the running execution into the "main" thread and
/// creates the idle thread; interrupts start enabled.
pub struct Kernel<P: Port> {
    pub(crate) port: P,

    // Thread arena and the scheduling queues. A tid appears in at most one
    // of {ready queue, a waiter queue, sleep queue} at a time.
    pub(crate) threads: BTreeMap<ThreadId, Thread<P>>,
    pub(crate) ready: VecDeque<ThreadId>,
    pub(crate) sleepers: VecDeque<ThreadId>,
    pub(crate) graveyard: VecDeque<Thread<P>>,

    // Synchronization-object arenas.
    pub(crate) locks: BTreeMap<LockId, Lock>,
    pub(crate) semas: BTreeMap<SemaId, Semaphore>,
    pub(crate) conds: BTreeMap<CondId, Condvar>,

    pub(crate) current: ThreadId,
    pub(crate) idle: ThreadId,
    pub(crate) initial: ThreadId,
    pub(crate) next_tid: u64,
    pub(crate) next_handle: u64,

    // Timer state.
    pub(crate) tick_count: i64,
    pub(crate) idle_ticks: i64,
    pub(crate) kernel_ticks: i64,
    pub(crate) slice_ticks: u32,
    pub(crate) loops_per_tick: u64,

    // Interrupt-level model for this single CPU.
    pub(crate) intr_on: bool,
    pub(crate) in_interrupt: bool,
    pub(crate) yield_pending: bool,
}

impl<P: Port> Kernel<P> {
    /// Boots the concurrency core on `port`.
    ///
    /// The running execution becomes the "main" thread (default priority,
    /// `Running`); a dedicated idle thread is created at the lowest priority
    /// and is scheduled only when the ready queue is empty. Interrupts are
    /// enabled when this returns.
    pub fn new(mut port: P) -> Self {
        let boot_ctx = port.bootstrap_context();
        let mut kernel = Kernel {
            port,
            threads: BTreeMap::new(),
            ready: VecDeque::new(),
            sleepers: VecDeque::new(),
            graveyard: VecDeque::new(),
            locks: BTreeMap::new(),
            semas: BTreeMap::new(),
            conds: BTreeMap::new(),
            current: ThreadId::BOOTSTRAP,
            idle: ThreadId::BOOTSTRAP,
            initial: ThreadId::BOOTSTRAP,
            next_tid: 1,
            next_handle: 1,
            tick_count: 0,
            idle_ticks: 0,
            kernel_ticks: 0,
            slice_ticks: 0,
            loops_per_tick: 0,
            intr_on: false,
            in_interrupt: false,
            yield_pending: false,
        };

        let main_tid = kernel.allocate_tid();
        let mut main = Thread::new(main_tid, "main", PRI_DEFAULT, boot_ctx);
        main.state = ThreadState::Running;
        kernel.threads.insert(main_tid, main);
        kernel.current = main_tid;
        kernel.initial = main_tid;

        // The idle loop itself (halting the CPU until the next interrupt)
        // belongs to the port; the core only needs a context to switch to.
        let idle_ctx = kernel
            .port
            .create_context(Box::new(|| {}))
            .expect("out of memory creating the idle thread");
        let idle_tid = kernel.allocate_tid();
        kernel
            .threads
            .insert(idle_tid, Thread::new(idle_tid, "idle", PRI_MIN, idle_ctx));
        kernel.idle = idle_tid;

        kernel.intr_on = true;
        log::debug!("kernel up: main is {main_tid}, idle is {idle_tid}");
        kernel
    }

    /// Borrows the platform port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Mutably borrows the platform port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub(crate) fn allocate_tid(&mut self) -> ThreadId {
        let tid = ThreadId(self.next_tid);
        self.next_tid += 1;
        tid
    }

    pub(crate) fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    pub(crate) fn thread(&self, tid: ThreadId) -> &Thread<P> {
        self.threads.get(&tid).expect("unknown thread id")
    }

    pub(crate) fn thread_mut(&mut self, tid: ThreadId) -> &mut Thread<P> {
        self.threads.get_mut(&tid).expect("unknown thread id")
    }
}
