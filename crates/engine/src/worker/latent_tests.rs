// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_adapters::FakeProvisioner;
use bm_core::{Clock, FakeClock, ProvisionerConfig, WorkerName};

fn latent(config: LatentConfig) -> LatentState {
    LatentState::new(config, Arc::new(FakeProvisioner::new()))
}

fn config() -> LatentConfig {
    LatentConfig::new(ProvisionerConfig::command("up", "down"))
}

#[tokio::test]
async fn every_waiter_sees_the_same_result() {
    let mut state = latent(config());
    let receivers: Vec<_> = (0..3).map(|_| state.join()).collect();

    let err = SubstantiationError::Declined(WorkerName::new("w1"));
    assert_eq!(state.resolve_waiters(Err(err.clone())), 3);
    for rx in receivers {
        assert_eq!(rx.await.unwrap(), Err(err.clone()));
    }
    assert!(state.waiters.is_empty());
}

#[test]
fn begin_bumps_attempt() {
    let clock = FakeClock::new();
    let mut state = latent(config());
    assert_eq!(state.state(), SubstantiationState::Insubstantiated);

    assert_eq!(state.begin(clock.utc()), 1);
    assert_eq!(state.begin(clock.utc()), 2);
    assert_eq!(state.state(), SubstantiationState::Substantiating);
    assert_eq!(state.substantiating_since, Some(clock.utc()));
}

#[test]
fn pending_admission_keeps_worker_busy() {
    let mut state = latent(config());
    assert!(state.is_idle());

    state.pending_admissions += 1;
    assert!(!state.is_idle());

    state.pending_admissions -= 1;
    state.active_builders.insert("build".into());
    assert!(!state.is_idle());
}

#[test]
fn no_backoff_by_default() {
    let clock = FakeClock::new();
    let mut state = latent(config());
    state.note_failed_start(clock.now());
    assert_eq!(state.backoff_remaining(clock.now()), None);
}

#[test]
fn backoff_counts_down() {
    let clock = FakeClock::new();
    let mut state = latent(config().start_retry_backoff(Some(Duration::from_secs(30))));
    state.note_failed_start(clock.now());

    clock.advance(Duration::from_secs(10));
    assert_eq!(state.backoff_remaining(clock.now()), Some(Duration::from_secs(20)));
    clock.advance(Duration::from_secs(20));
    assert_eq!(state.backoff_remaining(clock.now()), None);
}

#[test]
fn keep_forever_accepts_unrequested_attach() {
    assert!(!latent(config()).accepts_unrequested_attach());
    assert!(latent(config().build_wait_timeout(None)).accepts_unrequested_attach());
}

#[test]
fn state_display() {
    assert_eq!(SubstantiationState::Substantiating.to_string(), "substantiating");
}
