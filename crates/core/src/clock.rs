// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling
//!
//! Timers are measured against the monotonic [`Instant`]; the wall-clock
//! reading only feeds operator-facing timelines (last connect/disconnect).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn utc(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct FakeTime {
    instant: Instant,
    utc: DateTime<Utc>,
}

/// Fake clock for testing with controllable time.
///
/// Clones share the same underlying time, so a test can hand one clone to
/// the master and advance another.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeTime>>,
}

impl FakeClock {
    pub fn new() -> Self {
        let utc = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        Self { inner: Arc::new(Mutex::new(FakeTime { instant: Instant::now(), utc })) }
    }

    /// Advance both readings by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut time = self.inner.lock();
        time.instant += duration;
        time.utc += chrono::Duration::from_std(duration).unwrap_or_default();
    }

    /// Set the wall-clock reading without moving the monotonic one
    pub fn set_utc(&self, utc: DateTime<Utc>) {
        self.inner.lock().utc = utc;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.inner.lock().instant
    }

    fn utc(&self) -> DateTime<Utc> {
        self.inner.lock().utc
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
