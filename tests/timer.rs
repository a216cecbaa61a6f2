//! Busy-wait calibration and sub-tick delays.
//!
//! The port delivers one tick every 5000 polls and the busy-wait loop polls
//! once per iteration, so calibration is exact: it must land on the largest
//! value below 5000 reachable from a power of two plus its next eight bits,
//! which is 4096 + 512 + 256 + 128 = 4992.

mod common;

#[test]
fn calibration_measures_loops_per_tick() {
    let mut k = common::ticking_kernel(5000);
    assert_eq!(k.loops_per_tick(), 0);

    k.calibrate();
    assert_eq!(k.loops_per_tick(), 4992);
}

#[test]
fn sub_tick_sleep_busy_waits_without_blocking() {
    let mut k = common::ticking_kernel(5000);
    let main = k.current();
    k.calibrate();

    // 5 ms is half a tick at 100 Hz: too short for the sleep queue.
    let polls_before = k.port().polls;
    k.sleep_ms(5);
    assert_eq!(k.current(), main);
    // 4992 * 5 / 1000 truncates to 24, times the 100 Hz tick rate: 2400
    // spin iterations, each polling the port once.
    assert_eq!(k.port().polls - polls_before, 2400);
}

#[test]
fn tick_or_longer_sleep_uses_the_sleep_queue() {
    let mut k = common::ticking_kernel(5000);
    let main = k.current();
    k.calibrate();

    // 20 ms is two ticks: the thread must block rather than spin.
    k.sleep_ms(20);
    assert_ne!(k.current(), main);
    assert_eq!(
        k.get_state(main),
        Some(strand::ThreadState::Blocked)
    );
}

#[test]
fn uncalibrated_sub_tick_sleep_is_a_noop() {
    let mut k = common::kernel();
    let main = k.current();

    k.sleep_us(500);
    assert_eq!(k.current(), main);
    assert_eq!(k.port().polls, 0);
}
