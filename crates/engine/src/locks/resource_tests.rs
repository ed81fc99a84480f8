// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_core::AccessMode::{Counting, Exclusive};
use yare::parameterized;

fn build() -> BuildId {
    BuildId::new()
}

fn repo(max_count: u32) -> ResourceLock {
    ResourceLock::new("repo", max_count, 1)
}

#[test]
fn counting_holders_fill_up_to_max_count() {
    let mut lock = repo(2);
    let (a, b, c) = (build(), build(), build());

    lock.claim(&a, Counting).unwrap();
    lock.claim(&b, Counting).unwrap();
    assert!(!lock.is_available(Counting));

    let wait = lock.wait_until_maybe_available(&c, Counting);
    assert!(!wait.is_ready());
    assert_eq!(lock.waiting(), 1);

    lock.release(&a, Counting).unwrap();
    assert_eq!(lock.waiting(), 0);
    assert!(lock.is_available(Counting));
    lock.claim(&c, Counting).unwrap();
}

#[tokio::test]
async fn release_signals_queued_waiter() {
    let mut lock = repo(2);
    let (a, b, c) = (build(), build(), build());
    lock.claim(&a, Counting).unwrap();
    lock.claim(&b, Counting).unwrap();

    let wait = lock.wait_until_maybe_available(&c, Counting);
    lock.release(&a, Counting).unwrap();
    wait.signaled().await;
}

#[test]
fn exclusive_waits_for_every_counting_holder() {
    let mut lock = repo(2);
    let a = build();
    lock.claim(&a, Counting).unwrap();
    assert!(!lock.is_available(Exclusive));

    lock.release(&a, Counting).unwrap();
    assert!(lock.is_available(Exclusive));
}

#[test]
fn exclusive_holder_blocks_everyone() {
    let mut lock = repo(3);
    lock.claim(&build(), Exclusive).unwrap();
    assert!(!lock.is_available(Counting));
    assert!(!lock.is_available(Exclusive));
}

#[test]
fn fifo_wake_stops_at_first_waiter_that_does_not_fit() {
    let mut lock = repo(1);
    let (a, b, c) = (build(), build(), build());
    lock.claim(&a, Exclusive).unwrap();

    let mut wait_b = lock.wait_until_maybe_available(&b, Counting);
    let mut wait_c = lock.wait_until_maybe_available(&c, Counting);
    lock.release(&a, Exclusive).unwrap();

    // B fits; C would be a second counting holder on a max_count=1 lock
    assert_eq!(lock.waiting(), 1);
    assert!(take_signal(&mut wait_b));
    assert!(!take_signal(&mut wait_c));

    lock.claim(&b, Counting).unwrap();
    assert!(!lock.is_available(Counting));
    assert_eq!(lock.waiting(), 1);
}

#[test]
fn queued_exclusive_is_not_overtaken_by_later_counting() {
    let mut lock = repo(3);
    let (a, b, c) = (build(), build(), build());
    lock.claim(&a, Counting).unwrap();
    lock.claim(&b, Counting).unwrap();

    let wait_x = lock.wait_until_maybe_available(&c, Exclusive);
    let d = build();
    // Counting is still available; a ready wait queues nothing
    assert!(lock.wait_until_maybe_available(&d, Counting).is_ready());
    lock.claim(&d, Counting).unwrap();

    let e = build();
    let mut wait_e = lock.wait_until_maybe_available(&e, Counting);
    lock.release(&a, Counting).unwrap();

    // The exclusive waiter at the front still does not fit, so the scan stops
    // and the grantable counting waiter behind it stays queued.
    assert_eq!(lock.waiting(), 2);
    assert!(!take_signal(&mut wait_e));
    drop(wait_x);
}

#[test]
fn unused_signal_is_passed_to_the_next_waiter() {
    let mut lock = repo(1);
    let (a, b, c) = (build(), build(), build());
    lock.claim(&a, Exclusive).unwrap();

    let mut wait_b = lock.wait_until_maybe_available(&b, Exclusive);
    let mut wait_c = lock.wait_until_maybe_available(&c, Exclusive);
    lock.release(&a, Exclusive).unwrap();
    assert!(take_signal(&mut wait_b));
    assert!(!take_signal(&mut wait_c));

    // B walks away without claiming
    assert_eq!(lock.wake_waiters(), 1);
    assert!(take_signal(&mut wait_c));
    assert_eq!(lock.waiting(), 0);
}

#[test]
fn wake_on_a_full_lock_signals_nobody() {
    let mut lock = repo(1);
    let (a, b) = (build(), build());
    lock.claim(&a, Counting).unwrap();
    let mut wait_b = lock.wait_until_maybe_available(&b, Counting);

    assert_eq!(lock.wake_waiters(), 0);
    assert!(!take_signal(&mut wait_b));
    assert_eq!(lock.waiting(), 1);
}

#[test]
fn release_skips_abandoned_waiters() {
    let mut lock = repo(1);
    let (a, b, c) = (build(), build(), build());
    lock.claim(&a, Exclusive).unwrap();

    let abandoned = lock.wait_until_maybe_available(&b, Exclusive);
    let mut wait_c = lock.wait_until_maybe_available(&c, Exclusive);
    drop(abandoned);

    lock.release(&a, Exclusive).unwrap();
    assert!(take_signal(&mut wait_c));
    assert_eq!(lock.waiting(), 0);
}

#[test]
fn wait_on_available_lock_is_ready_immediately() {
    let mut lock = repo(1);
    let wait = lock.wait_until_maybe_available(&build(), Exclusive);
    assert!(wait.is_ready());
    assert_eq!(wait.id(), None);
    assert!(lock.is_idle());
}

#[test]
fn cancel_removes_queued_wait() {
    let mut lock = repo(1);
    let (a, b) = (build(), build());
    lock.claim(&a, Exclusive).unwrap();

    let wait = lock.wait_until_maybe_available(&b, Counting);
    let id = wait.id().unwrap();
    lock.stop_waiting_until_available(&b, id).unwrap();
    assert_eq!(lock.waiting(), 0);
}

#[test]
fn cancel_after_signal_is_usage_error() {
    let mut lock = repo(1);
    let (a, b) = (build(), build());
    lock.claim(&a, Exclusive).unwrap();

    let wait = lock.wait_until_maybe_available(&b, Counting);
    let id = wait.id().unwrap();
    lock.release(&a, Exclusive).unwrap();

    let err = lock.stop_waiting_until_available(&b, id).unwrap_err();
    assert_eq!(err, LockError::NotWaiting { lock: "repo".into(), owner: b });
}

#[test]
fn cancel_twice_is_usage_error() {
    let mut lock = repo(1);
    let (a, b) = (build(), build());
    lock.claim(&a, Exclusive).unwrap();
    let id = lock.wait_until_maybe_available(&b, Counting).id().unwrap();

    lock.stop_waiting_until_available(&b, id).unwrap();
    assert!(lock.stop_waiting_until_available(&b, id).is_err());
}

#[parameterized(
    counting_over_exclusive = { Exclusive, Counting },
    exclusive_over_counting = { Counting, Exclusive },
    exclusive_over_exclusive = { Exclusive, Exclusive },
)]
fn claim_without_availability_is_rejected(held: AccessMode, wanted: AccessMode) {
    let mut lock = repo(1);
    let (a, b) = (build(), build());
    lock.claim(&a, held).unwrap();

    let err = lock.claim(&b, wanted).unwrap_err();
    assert!(matches!(err, LockError::Unavailable { .. }));
    assert_eq!(lock.owners(), &[(a, held)]);
}

#[parameterized(
    never_claimed = { None },
    other_mode = { Some(Exclusive) },
)]
fn release_of_unheld_lock_is_rejected(held: Option<AccessMode>) {
    let mut lock = repo(2);
    let a = build();
    if let Some(mode) = held {
        lock.claim(&a, mode).unwrap();
    }

    let err = lock.release(&a, Counting).unwrap_err();
    assert_eq!(err, LockError::NotHeld { lock: "repo".into(), owner: a, mode: Counting });
    assert_eq!(lock.owners().len(), usize::from(held.is_some()));
}

fn take_signal(wait: &mut LockWait) -> bool {
    match wait.rx.as_mut() {
        Some(rx) => rx.try_recv().is_ok(),
        None => true,
    }
}
