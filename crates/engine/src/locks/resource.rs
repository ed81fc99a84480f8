// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A named counting/exclusive semaphore with a FIFO wait queue.
//!
//! Holders are builds. Counting holders share the lock up to `max_count`;
//! an exclusive holder shuts everyone else out. Waiters are never granted
//! the lock directly: a release only signals them that it may now be free,
//! and each one re-checks and claims in its own turn.

use crate::error::LockError;
use bm_core::{AccessMode, BuildId};
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Token for one queued wait, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

#[derive(Debug)]
struct Waiter {
    id: WaiterId,
    owner: BuildId,
    mode: AccessMode,
    notify: oneshot::Sender<()>,
}

/// Handle returned by [`ResourceLock::wait_until_maybe_available`].
#[derive(Debug)]
pub struct LockWait {
    id: Option<WaiterId>,
    rx: Option<oneshot::Receiver<()>>,
}

impl LockWait {
    fn ready() -> Self {
        Self { id: None, rx: None }
    }

    /// True when the lock was already available and nothing was queued.
    pub fn is_ready(&self) -> bool {
        self.rx.is_none()
    }

    /// Queue position token, or `None` for an already-ready wait.
    pub fn id(&self) -> Option<WaiterId> {
        self.id
    }

    /// Resolve once a release signals this waiter.
    ///
    /// Also resolves if the lock itself goes away, since the caller re-checks
    /// availability either way.
    pub async fn signaled(self) {
        if let Some(rx) = self.rx {
            let _ = rx.await;
        }
    }
}

#[derive(Debug)]
pub struct ResourceLock {
    name: String,
    max_count: u32,
    instance: u64,
    owners: Vec<(BuildId, AccessMode)>,
    waiters: VecDeque<Waiter>,
    next_waiter: u64,
}

impl ResourceLock {
    /// `instance` distinguishes two locks that share a name, e.g. across a
    /// reconfiguration that changed the limit.
    pub fn new(name: impl Into<String>, max_count: u32, instance: u64) -> Self {
        Self {
            name: name.into(),
            max_count,
            instance,
            owners: Vec::new(),
            waiters: VecDeque::new(),
            next_waiter: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn owners(&self) -> &[(BuildId, AccessMode)] {
        &self.owners
    }

    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    /// No holders and nobody queued.
    pub fn is_idle(&self) -> bool {
        self.owners.is_empty() && self.waiters.is_empty()
    }

    pub fn holds(&self, owner: &BuildId, mode: AccessMode) -> bool {
        self.owners.iter().any(|(o, m)| o == owner && *m == mode)
    }

    fn counts(&self) -> (u32, u32) {
        self.owners.iter().fold((0, 0), |(counting, exclusive), (_, mode)| match mode {
            AccessMode::Counting => (counting + 1, exclusive),
            AccessMode::Exclusive => (counting, exclusive + 1),
        })
    }

    fn grantable(&self, mode: AccessMode, counting: u32, exclusive: u32) -> bool {
        match mode {
            AccessMode::Counting => exclusive == 0 && counting < self.max_count,
            AccessMode::Exclusive => exclusive == 0 && counting == 0,
        }
    }

    /// Whether `mode` could be claimed right now. Queued waiters do not count.
    pub fn is_available(&self, mode: AccessMode) -> bool {
        let (counting, exclusive) = self.counts();
        self.grantable(mode, counting, exclusive)
    }

    /// Take the lock for `owner`.
    pub fn claim(&mut self, owner: &BuildId, mode: AccessMode) -> Result<(), LockError> {
        if !self.is_available(mode) {
            return Err(LockError::Unavailable {
                lock: self.name.clone(),
                owner: owner.clone(),
                mode,
            });
        }
        self.owners.push((owner.clone(), mode));
        tracing::debug!(lock = %self.name, owner = %owner, %mode, "lock claimed");
        Ok(())
    }

    /// Give the lock back and signal whichever queued waiters it frees.
    pub fn release(&mut self, owner: &BuildId, mode: AccessMode) -> Result<(), LockError> {
        let Some(pos) = self.owners.iter().position(|(o, m)| o == owner && *m == mode) else {
            return Err(LockError::NotHeld { lock: self.name.clone(), owner: owner.clone(), mode });
        };
        self.owners.remove(pos);
        tracing::debug!(lock = %self.name, owner = %owner, %mode, "lock released");
        self.wake_waiters();
        Ok(())
    }

    /// Signal queued waiters that the lock may now fit them.
    ///
    /// Waiters are signaled front to back while their mode would still fit,
    /// counting the ones already signaled in this pass. The scan stops at the
    /// first waiter that would not fit, so nobody overtakes it. A signaled
    /// waiter that then does not claim must call this again, or the waiters
    /// behind it are never told.
    pub fn wake_waiters(&mut self) -> usize {
        let (mut counting, mut exclusive) = self.counts();
        let mut signaled = 0;
        while let Some(front) = self.waiters.front() {
            if !self.grantable(front.mode, counting, exclusive) {
                break;
            }
            let Some(waiter) = self.waiters.pop_front() else { break };
            if waiter.notify.send(()).is_err() {
                // Receiver gone: the waiter gave up without cancelling.
                continue;
            }
            tracing::debug!(lock = %self.name, owner = %waiter.owner, mode = %waiter.mode, "waiter signaled");
            signaled += 1;
            match waiter.mode {
                AccessMode::Counting => counting += 1,
                AccessMode::Exclusive => exclusive += 1,
            }
        }
        signaled
    }

    /// Get a handle that resolves when the lock may be available for `mode`.
    ///
    /// If it is available now the handle is already resolved and nothing is
    /// queued. Otherwise the request joins the back of the queue.
    pub fn wait_until_maybe_available(&mut self, owner: &BuildId, mode: AccessMode) -> LockWait {
        if self.is_available(mode) {
            return LockWait::ready();
        }
        let id = WaiterId(self.next_waiter);
        self.next_waiter += 1;
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(Waiter { id, owner: owner.clone(), mode, notify: tx });
        tracing::debug!(lock = %self.name, owner = %owner, %mode, queued = self.waiters.len(), "waiting for lock");
        LockWait { id: Some(id), rx: Some(rx) }
    }

    /// Remove a queued wait that has not been signaled yet.
    pub fn stop_waiting_until_available(
        &mut self,
        owner: &BuildId,
        id: WaiterId,
    ) -> Result<(), LockError> {
        let Some(pos) = self.waiters.iter().position(|w| w.id == id && w.owner == *owner) else {
            return Err(LockError::NotWaiting { lock: self.name.clone(), owner: owner.clone() });
        };
        self.waiters.remove(pos);
        Ok(())
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "property_tests.rs"]
mod property_tests;
