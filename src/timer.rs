//! System tick, sleep queue, and sub-tick delays.
//!
//! The platform timer interrupts [`TIMER_FREQ`] times per second. Each tick
//! advances the global tick count, wakes any sleepers whose deadline has
//! arrived, and enforces the round-robin time slice. Sleeping threads wait in
//! a queue sorted by ascending wakeup tick, so the interrupt handler only
//! inspects the front.
//!
//! Delays shorter than one tick cannot use the sleep queue; they spin in a
//! busy-wait loop whose iteration cost is measured once at boot by
//! [`Kernel::calibrate`].

use crate::interrupt::InterruptState;
use crate::thread::scheduler::TIME_SLICE;
use crate::{Kernel, Port};
use core::sync::atomic::{compiler_fence, Ordering};
use crossbeam_utils::Backoff;

/// Timer interrupts per second.
pub const TIMER_FREQ: i64 = 100;

impl<P: Port> Kernel<P> {
    /// Ticks elapsed since boot.
    pub fn ticks(&mut self) -> i64 {
        // The count is written from the timer interrupt handler; reading it
        // under masking gives a consistent snapshot. The fence keeps callers
        // that poll in a loop from hoisting the read.
        let t = self.masked(|k| k.tick_count);
        compiler_fence(Ordering::SeqCst);
        t
    }

    /// Ticks elapsed since `then`, itself a value returned by
    /// [`Kernel::ticks`].
    pub fn elapsed(&mut self, then: i64) -> i64 {
        self.ticks() - then
    }

    /// Suspends the running thread for approximately `n` ticks. A
    /// non-positive `n` returns immediately.
    ///
    /// The thread blocks in the sleep queue and consumes no CPU until the
    /// timer interrupt wakes it; it then becomes runnable and runs whenever
    /// the scheduler next picks it, so the actual delay is at least `n`
    /// ticks.
    pub fn sleep(&mut self, n: i64) {
        if n <= 0 {
            return;
        }
        assert_eq!(
            self.interrupt_state(),
            InterruptState::On,
            "sleep with interrupts masked"
        );
        assert!(!self.in_interrupt, "sleep from interrupt context");
        let start = self.ticks();
        self.masked(|k| {
            let cur = k.current;
            k.thread_mut(cur).wakeup_tick = start + n;
            k.sleeper_insert(cur);
            k.block();
        });
    }

    /// Delivers one timer interrupt. The platform calls this from its timer
    /// interrupt vector.
    pub fn timer_interrupt(&mut self) {
        self.external_interrupt(|k| k.tick());
    }

    /// The timer interrupt body: advance the clock, wake due sleepers, and
    /// enforce the time slice. Runs in interrupt context with interrupts
    /// masked.
    fn tick(&mut self) {
        self.tick_count += 1;
        if self.current == self.idle {
            self.idle_ticks += 1;
        } else {
            self.kernel_ticks += 1;
        }

        // The sleep queue is sorted by wakeup tick; everything due is at the
        // front.
        while let Some(&front) = self.sleepers.front() {
            if self.thread(front).wakeup_tick > self.tick_count {
                break;
            }
            self.sleepers.pop_front();
            log::trace!("tick {}: waking {front}", self.tick_count);
            self.unblock(front);
        }
        // A wakeup may have produced a higher-priority runnable thread; the
        // preemption check turns into a yield at the handler's return point.
        self.maybe_preempt();

        self.slice_ticks += 1;
        if self.slice_ticks >= TIME_SLICE {
            self.request_yield_on_return();
        }
    }

    fn sleeper_insert(&mut self, tid: crate::ThreadId) {
        debug_assert!(!self.sleepers.contains(&tid), "thread already sleeping");
        let wakeup = self.thread(tid).wakeup_tick;
        let pos = crate::util::insertion_point(&self.sleepers, |&t| {
            wakeup < self.thread(t).wakeup_tick
        });
        self.sleepers.insert(pos, tid);
    }

    /// Suspends execution for approximately `ms` milliseconds.
    pub fn sleep_ms(&mut self, ms: i64) {
        self.real_time_sleep(ms, 1000);
    }

    /// Suspends execution for approximately `us` microseconds.
    pub fn sleep_us(&mut self, us: i64) {
        self.real_time_sleep(us, 1_000_000);
    }

    /// Suspends execution for approximately `ns` nanoseconds.
    pub fn sleep_ns(&mut self, ns: i64) {
        self.real_time_sleep(ns, 1_000_000_000);
    }

    /// Sleeps for approximately `num / denom` seconds.
    ///
    /// Delays of at least one tick go through the sleep queue and let other
    /// threads run. Shorter delays busy-wait for accuracy; they burn CPU but
    /// never give up the processor.
    fn real_time_sleep(&mut self, num: i64, denom: i64) {
        // Scaled this way to avoid overflow in `num * TIMER_FREQ`:
        //   (num / denom) s = num * TIMER_FREQ / denom ticks.
        let ticks = num * TIMER_FREQ / denom;
        if ticks > 0 {
            self.sleep(ticks);
        } else {
            // Sub-tick delay. The denominators in use are all multiples of
            // 1000, which keeps the loop-count arithmetic in range.
            assert_eq!(denom % 1000, 0);
            let loops = self.loops_per_tick as i64 * num / 1000 * TIMER_FREQ / (denom / 1000);
            if loops > 0 {
                self.busy_wait(loops as u64);
            }
        }
    }

    /// Measures how many busy-wait iterations fit in one timer tick. Run
    /// once after the timer starts ticking; sub-tick delays are unusable
    /// before then.
    pub fn calibrate(&mut self) {
        assert_eq!(self.interrupt_state(), InterruptState::On);
        assert!(!self.in_interrupt);
        log::info!("calibrating busy-wait delay loop...");

        // Find the largest power of two that still fits in one tick.
        let mut loops_per_tick: u64 = 1 << 10;
        while !self.too_many_loops(loops_per_tick << 1) {
            loops_per_tick <<= 1;
        }

        // Refine the next 8 bits below the leading one.
        let high_bit = loops_per_tick;
        let mut test_bit = high_bit >> 1;
        while test_bit != high_bit >> 10 {
            if !self.too_many_loops(loops_per_tick | test_bit) {
                loops_per_tick |= test_bit;
            }
            test_bit >>= 1;
        }

        self.loops_per_tick = loops_per_tick;
        log::info!(
            "{} busy-wait loops per second",
            loops_per_tick * TIMER_FREQ as u64
        );
    }

    /// Whether `loops` busy-wait iterations overrun one timer tick.
    fn too_many_loops(&mut self, loops: u64) -> bool {
        // Align to a tick boundary first so the measurement spans whole
        // ticks.
        let start = self.ticks();
        while self.ticks() == start {
            self.poll_timer();
        }
        let start = self.ticks();
        self.busy_wait(loops);
        start != self.ticks()
    }

    /// Spins for `loops` iterations, servicing the timer as it goes.
    #[inline(never)]
    fn busy_wait(&mut self, loops: u64) {
        let backoff = Backoff::new();
        for _ in 0..loops {
            self.poll_timer();
            backoff.spin();
        }
    }

    /// Services a pending timer tick, if the port reports one. Ticks that
    /// arrive while interrupts are masked are dropped; the spin paths that
    /// poll all run unmasked.
    fn poll_timer(&mut self) {
        if self.port.poll_tick() && self.intr_on && !self.in_interrupt {
            self.timer_interrupt();
        }
    }

    /// Busy-wait iterations per tick, as measured by [`Kernel::calibrate`].
    pub fn loops_per_tick(&self) -> u64 {
        self.loops_per_tick
    }

    /// Ticks spent in the idle thread.
    pub fn idle_ticks(&self) -> i64 {
        self.idle_ticks
    }

    /// Ticks spent running ordinary threads.
    pub fn kernel_ticks(&self) -> i64 {
        self.kernel_ticks
    }

    /// Logs the tick accounting totals.
    pub fn log_stats(&mut self) {
        let total = self.ticks();
        log::info!(
            "{total} ticks: {} idle, {} kernel",
            self.idle_ticks,
            self.kernel_ticks
        );
    }
}
