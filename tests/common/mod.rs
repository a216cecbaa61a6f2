//! A simulated port for driving the core from a test.
//!
//! `SimPort` backs execution contexts with plain integers and records every
//! handoff instead of swapping stacks. Its `switch` returns immediately, so
//! after any operation that switches threads, the test itself continues as
//! whichever thread the scheduler picked; spawned entry closures never run.
//! The optional tick source reports a timer interrupt due every N polls,
//! which makes busy-wait calibration fully deterministic.

#![allow(dead_code)]

use strand::{Kernel, KernelError, Port, ThreadEntry, ThreadId};

/// An execution context: just a serial number.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SimContext(pub usize);

pub struct SimPort {
    next_ctx: usize,
    /// Remaining context allocations before `create_context` starts failing.
    /// `None` means unlimited.
    pub context_budget: Option<usize>,
    /// Deliver a tick every this many `poll_tick` calls.
    pub tick_every: Option<u64>,
    pub polls: u64,
    /// Every context handoff, as (outgoing, incoming) serial numbers.
    pub switches: Vec<(usize, usize)>,
    pub destroyed: Vec<usize>,
    pub activated: Vec<ThreadId>,
}

impl SimPort {
    pub fn new() -> Self {
        SimPort {
            next_ctx: 0,
            context_budget: None,
            tick_every: None,
            polls: 0,
            switches: Vec::new(),
            destroyed: Vec::new(),
            activated: Vec::new(),
        }
    }

    pub fn ticking(every: u64) -> Self {
        let mut port = SimPort::new();
        port.tick_every = Some(every);
        port
    }
}

impl Port for SimPort {
    type Context = SimContext;

    fn bootstrap_context(&mut self) -> SimContext {
        // Serial 0 is always the boot execution.
        assert_eq!(self.next_ctx, 0);
        self.next_ctx = 1;
        SimContext(0)
    }

    fn create_context(&mut self, _entry: ThreadEntry) -> Result<SimContext, KernelError> {
        match &mut self.context_budget {
            Some(0) => return Err(KernelError::NoMemory),
            Some(n) => *n -= 1,
            None => {}
        }
        let ctx = SimContext(self.next_ctx);
        self.next_ctx += 1;
        Ok(ctx)
    }

    fn destroy_context(&mut self, context: SimContext) {
        self.destroyed.push(context.0);
    }

    fn switch(&mut self, prev: &mut SimContext, next: &mut SimContext) {
        self.switches.push((prev.0, next.0));
    }

    fn activate(&mut self, tid: ThreadId) {
        self.activated.push(tid);
    }

    fn poll_tick(&mut self) -> bool {
        self.polls += 1;
        match self.tick_every {
            Some(every) => self.polls % every == 0,
            None => false,
        }
    }
}

/// A booted kernel on a non-ticking simulated port. The test starts out
/// running as the "main" thread.
pub fn kernel() -> Kernel<SimPort> {
    Kernel::new(SimPort::new())
}

/// A booted kernel whose port reports a timer tick every `every` polls.
pub fn ticking_kernel(every: u64) -> Kernel<SimPort> {
    Kernel::new(SimPort::ticking(every))
}
