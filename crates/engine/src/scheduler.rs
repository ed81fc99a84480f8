// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deadline-ordered timers.
//!
//! Timers do not run on their own. The owner polls [`Scheduler::fired_timers`]
//! with the current instant and feeds the returned events back in.

use bm_core::{Event, TimerId};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<TimerId, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `id` to fire `duration` after `now`, replacing any earlier deadline.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration, now: Instant) {
        self.timers.insert(id, now + duration);
    }

    pub fn cancel_timer(&mut self, id: &TimerId) {
        self.timers.remove(id);
    }

    pub fn is_set(&self, id: &TimerId) -> bool {
        self.timers.contains_key(id)
    }

    pub fn deadline(&self, id: &TimerId) -> Option<Instant> {
        self.timers.get(id).copied()
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn fired_timers(&mut self, now: Instant) -> Vec<Event> {
        let mut due: Vec<(Instant, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, id.clone()))
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));

        due.into_iter()
            .map(|(_, id)| {
                self.timers.remove(&id);
                Event::TimerFired { id }
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
