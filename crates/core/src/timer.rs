// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer identifier type for tracking scheduled timers.
//!
//! Each worker owns at most one timer of each kind; the id encodes both, so
//! re-arming a timer replaces the previous deadline instead of stacking a
//! second one.

use crate::worker::WorkerName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a timer instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(String);

impl TimerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fires when a disconnected worker has not come back in time.
    pub fn missing(worker: &WorkerName) -> Self {
        TimerKind::Missing(worker.as_str()).to_timer_id()
    }

    /// Fires when a latent worker did not attach within its substantiation deadline.
    pub fn substantiation(worker: &WorkerName) -> Self {
        TimerKind::Substantiation(worker.as_str()).to_timer_id()
    }

    /// Fires when a substantiated latent worker has sat idle for too long.
    pub fn build_wait(worker: &WorkerName) -> Self {
        TimerKind::BuildWait(worker.as_str()).to_timer_id()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse this timer ID into a typed `TimerKind`.
    pub fn kind(&self) -> Option<TimerKind<'_>> {
        TimerKind::parse(&self.0)
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for TimerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Parsed representation of a timer ID for type-safe routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind<'a> {
    Missing(&'a str),
    Substantiation(&'a str),
    BuildWait(&'a str),
}

impl<'a> TimerKind<'a> {
    /// Parse a timer ID string into a typed `TimerKind`.
    ///
    /// Returns `None` for unrecognized timer ID formats.
    pub fn parse(id: &'a str) -> Option<TimerKind<'a>> {
        let (prefix, worker) = id.split_once(':')?;
        if worker.is_empty() {
            return None;
        }
        match prefix {
            "missing" => Some(TimerKind::Missing(worker)),
            "substantiation" => Some(TimerKind::Substantiation(worker)),
            "build-wait" => Some(TimerKind::BuildWait(worker)),
            _ => None,
        }
    }

    /// Format this `TimerKind` back into a canonical `TimerId`.
    pub fn to_timer_id(&self) -> TimerId {
        match self {
            TimerKind::Missing(w) => TimerId::new(format!("missing:{w}")),
            TimerKind::Substantiation(w) => TimerId::new(format!("substantiation:{w}")),
            TimerKind::BuildWait(w) => TimerId::new(format!("build-wait:{w}")),
        }
    }

    /// The worker this timer belongs to.
    pub fn worker(&self) -> &'a str {
        match self {
            TimerKind::Missing(w) | TimerKind::Substantiation(w) | TimerKind::BuildWait(w) => w,
        }
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
