// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_core::{Clock, FakeClock, WorkerName};

fn worker() -> WorkerName {
    WorkerName::new("w1")
}

#[test]
fn scheduler_timer_lifecycle() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();

    scheduler.set_timer(TimerId::missing(&worker()), Duration::from_secs(10), clock.now());
    assert!(scheduler.has_timers());
    assert!(scheduler.next_deadline().is_some());

    // Timer hasn't fired yet
    clock.advance(Duration::from_secs(5));
    assert!(scheduler.fired_timers(clock.now()).is_empty());
    assert!(scheduler.has_timers());

    // Timer fires
    clock.advance(Duration::from_secs(10));
    let events = scheduler.fired_timers(clock.now());
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::TimerFired { ref id } if *id == "missing:w1"));
    assert!(!scheduler.has_timers());
}

#[test]
fn scheduler_cancel_timer() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();

    let id = TimerId::build_wait(&worker());
    scheduler.set_timer(id.clone(), Duration::from_secs(10), clock.now());
    scheduler.cancel_timer(&id);

    clock.advance(Duration::from_secs(15));
    assert!(scheduler.fired_timers(clock.now()).is_empty());
}

#[test]
fn rearming_replaces_deadline() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();
    let id = TimerId::build_wait(&worker());

    scheduler.set_timer(id.clone(), Duration::from_secs(10), clock.now());
    clock.advance(Duration::from_secs(8));
    scheduler.set_timer(id.clone(), Duration::from_secs(10), clock.now());

    clock.advance(Duration::from_secs(5));
    assert!(scheduler.fired_timers(clock.now()).is_empty());
    clock.advance(Duration::from_secs(5));
    assert_eq!(scheduler.fired_timers(clock.now()).len(), 1);
}

#[test]
fn fired_timers_come_out_in_deadline_order() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();
    let late = TimerId::substantiation(&worker());
    let early = TimerId::missing(&WorkerName::new("w2"));

    scheduler.set_timer(late.clone(), Duration::from_secs(20), clock.now());
    scheduler.set_timer(early.clone(), Duration::from_secs(10), clock.now());
    assert_eq!(scheduler.deadline(&early), scheduler.next_deadline());

    clock.advance(Duration::from_secs(30));
    let fired: Vec<TimerId> = scheduler
        .fired_timers(clock.now())
        .into_iter()
        .filter_map(|e| match e {
            Event::TimerFired { id } => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(fired, vec![early, late]);
}
