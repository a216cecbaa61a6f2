//! Semaphores, locks, and condition variables.

mod common;

use strand::sync::WouldBlock;
use strand::{ThreadState, PRI_DEFAULT};

#[test]
fn sema_down_blocks_at_zero_and_up_wakes() {
    let mut k = common::kernel();
    let main = k.current();
    let s = k.semaphore(0);

    k.sema_down(s);
    // main is parked on the semaphore; idle took over.
    let idle = k.current();
    assert_ne!(idle, main);
    assert_eq!(k.get_state(main), Some(ThreadState::Blocked));

    k.sema_up(s);
    // Direct handoff: the permit went straight to the waiter, and the waiter
    // outranks idle.
    assert_eq!(k.current(), main);
    assert_eq!(k.sema_value(s), 0);
}

#[test]
fn sema_up_without_waiters_banks_the_permit() {
    let mut k = common::kernel();
    let main = k.current();
    let s = k.semaphore(0);

    k.sema_up(s);
    assert_eq!(k.sema_value(s), 1);

    // The banked permit satisfies the next down without blocking.
    k.sema_down(s);
    assert_eq!(k.current(), main);
    assert_eq!(k.sema_value(s), 0);
}

#[test]
fn sema_try_down_never_blocks() {
    let mut k = common::kernel();
    let s = k.semaphore(1);

    assert_eq!(k.sema_try_down(s), Ok(()));
    assert_eq!(k.sema_try_down(s), Err(WouldBlock));
    assert_eq!(k.sema_value(s), 0);
}

#[test]
fn sema_up_from_interrupt_defers_the_yield_to_handler_return() {
    let mut k = common::kernel();
    let main = k.current();
    let s = k.semaphore(0);

    k.sema_down(s);
    let idle = k.current();

    k.external_interrupt(|k| {
        k.sema_up(s);
        // The waiter is runnable but no switch happens inside the handler.
        assert_eq!(k.current(), idle);
        assert_eq!(k.get_state(main), Some(ThreadState::Ready));
    });
    assert_eq!(k.current(), main);
}

#[test]
fn lock_hands_off_between_two_threads() {
    let mut k = common::kernel();
    let main = k.current();
    let l = k.lock();
    k.lock_acquire(l);
    assert!(k.lock_held_by_current(l));

    let hi = k.spawn("hi", PRI_DEFAULT + 9, || {}).unwrap();
    assert_eq!(k.current(), hi);
    assert_eq!(k.lock_try_acquire(l), Err(WouldBlock));

    k.lock_acquire(l); // blocks; the holder runs again
    assert_eq!(k.current(), main);
    k.lock_release(l);
    assert_eq!(k.current(), hi);
    assert!(k.lock_held_by_current(l));

    k.lock_release(l);
    assert_eq!(k.lock_holder(l), None);
    assert_eq!(k.lock_try_acquire(l), Ok(()));
}

#[test]
#[should_panic(expected = "lock re-acquired by its holder")]
fn recursive_acquire_is_a_bug() {
    let mut k = common::kernel();
    let l = k.lock();
    k.lock_acquire(l);
    k.lock_acquire(l);
}

#[test]
#[should_panic(expected = "lock released by a thread that does not hold it")]
fn releasing_an_unheld_lock_is_a_bug() {
    let mut k = common::kernel();
    let l = k.lock();
    k.lock_release(l);
}

#[test]
#[should_panic(expected = "cond_wait without holding the lock")]
fn cond_wait_requires_the_lock() {
    let mut k = common::kernel();
    let l = k.lock();
    let c = k.condvar();
    k.cond_wait(c, l);
}

#[test]
fn cond_signal_requeues_the_waiter_onto_the_lock() {
    let mut k = common::kernel();
    let main = k.current();
    let l = k.lock();
    let c = k.condvar();

    k.lock_acquire(l);
    k.cond_wait(c, l);
    // main atomically released the lock and went to sleep; idle runs.
    let idle = k.current();
    assert_ne!(idle, main);
    assert_eq!(k.cond_waiter_count(c), 1);
    assert_eq!(k.lock_holder(l), None);

    k.lock_acquire(l);
    k.cond_signal(c);
    // Signaled, but not yet running: the waiter contends for the lock and
    // resumes only once the signaler releases it.
    assert_eq!(k.cond_waiter_count(c), 0);
    assert_eq!(k.get_state(main), Some(ThreadState::Blocked));

    k.lock_release(l);
    assert_eq!(k.current(), main);
    assert!(k.lock_held_by_current(l));
}

#[test]
fn cond_signal_picks_the_highest_priority_waiter() {
    let mut k = common::kernel();
    let main = k.current();
    let l = k.lock();
    let c = k.condvar();

    k.lock_acquire(l);
    k.cond_wait(c, l);
    // Running as idle now; stand up a second, higher-priority waiter.
    let hi = k.spawn("hi", PRI_DEFAULT + 9, || {}).unwrap();
    assert_eq!(k.current(), hi);
    k.lock_acquire(l);
    k.cond_wait(c, l);
    assert_eq!(k.cond_waiter_count(c), 2);

    // Back as idle: signal once and pass the lock on.
    k.lock_acquire(l);
    k.cond_signal(c);
    k.lock_release(l);
    assert_eq!(k.current(), hi);
    assert!(k.lock_held_by_current(l));
    assert_eq!(k.get_state(main), Some(ThreadState::Blocked));
    assert_eq!(k.cond_waiter_count(c), 1);
}

#[test]
fn cond_broadcast_wakes_every_waiter() {
    let mut k = common::kernel();
    let main = k.current();
    let l = k.lock();
    let c = k.condvar();

    k.lock_acquire(l);
    k.cond_wait(c, l);
    // Running as idle; add a second waiter at the same priority.
    let peer = k.spawn("peer", PRI_DEFAULT, || {}).unwrap();
    assert_eq!(k.current(), peer);
    k.lock_acquire(l);
    k.cond_wait(c, l);
    assert_eq!(k.cond_waiter_count(c), 2);

    k.lock_acquire(l);
    k.cond_broadcast(c);
    assert_eq!(k.cond_waiter_count(c), 0);

    // Both waiters now contend for the lock; equal priorities resolve FIFO,
    // so main gets it first, then peer.
    k.lock_release(l);
    assert_eq!(k.current(), main);
    assert!(k.lock_held_by_current(l));

    k.lock_release(l);
    assert_eq!(k.lock_holder(l), Some(peer));
    assert_eq!(k.get_state(peer), Some(ThreadState::Ready));
}
