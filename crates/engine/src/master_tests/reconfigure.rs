// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_core::{BuildRequest, LatentConfig};

fn repo(max_count: u32) -> LockIdentifier {
    LockIdentifier::master("repo", max_count)
}

fn counting_worker(name: &str, lock: &LockIdentifier) -> WorkerConfig {
    WorkerConfig::builder().name(name).locks(vec![lock.counting()]).build()
}

fn two_workers(lock: &LockIdentifier) -> MasterConfig {
    MasterConfig {
        locks: vec![lock.clone()],
        workers: vec![counting_worker("w1", lock), counting_worker("w2", lock)],
    }
}

#[tokio::test]
async fn workers_are_added_and_removed() {
    let mut ctx = setup_workers(vec![WorkerConfig::builder().name("w1").build(), watched("w2")]);
    let w1 = ctx.connect("w1").await;
    assert!(ctx.master.timer_is_set(&TimerId::missing(&WorkerName::new("w2"))));

    ctx.master.reconfigure(MasterConfig {
        locks: Vec::new(),
        workers: vec![WorkerConfig::builder().name("w3").build()],
    });
    ctx.process_background_events().await;

    assert_eq!(ctx.master.worker_names(), vec![WorkerName::new("w3")]);
    assert_eq!(w1.close_requests(), 1);
    assert!(!ctx.master.timer_is_set(&TimerId::missing(&WorkerName::new("w2"))));
}

#[tokio::test]
async fn updated_worker_keeps_its_connection() {
    let mut ctx = setup_workers(vec![WorkerConfig::builder().name("w1").build()]);
    let connection = ctx.connect("w1").await;

    ctx.master.reconfigure(MasterConfig {
        locks: Vec::new(),
        workers: vec![WorkerConfig::builder().name("w1").builders(vec!["build".into(), "docs".into()]).build()],
    });

    assert_eq!(connection.close_requests(), 0);
    assert_eq!(ctx.status("w1").connection, ConnectionState::Connected);
    assert!(ctx.master.can_admit_build("w1", "docs"));
}

#[tokio::test]
async fn enabling_notifications_arms_the_missing_timer() {
    let ctx = setup_workers(vec![WorkerConfig::builder().name("w1").build()]);
    let timer = TimerId::missing(&WorkerName::new("w1"));
    assert!(!ctx.master.timer_is_set(&timer));

    ctx.master.reconfigure(MasterConfig { locks: Vec::new(), workers: vec![watched("w1")] });
    assert!(ctx.master.timer_is_set(&timer));

    ctx.master.reconfigure(MasterConfig {
        locks: Vec::new(),
        workers: vec![WorkerConfig::builder().name("w1").build()],
    });
    assert!(!ctx.master.timer_is_set(&timer));
}

#[tokio::test]
async fn removed_latent_worker_is_stopped_fast() {
    let mut ctx = setup_workers(vec![latent_worker("cloud", Some(Duration::from_secs(600)))]);
    let connection = bring_up(&mut ctx, "cloud").await;

    ctx.master.reconfigure(MasterConfig::default());
    ctx.process_background_events().await;

    assert_eq!(ctx.provisioner.stops(), vec![true]);
    assert_eq!(connection.close_requests(), 1);
    assert!(ctx.master.worker_names().is_empty());
}

#[tokio::test]
async fn removed_latent_worker_aborts_waiters() {
    let mut ctx = setup_workers(vec![latent_worker("cloud", Some(Duration::from_secs(600)))]);
    let master = ctx.master.clone();
    let handle = tokio::spawn(async move {
        master.substantiate("cloud", StartContext::new(WorkerName::new("cloud"))).await
    });
    ctx.process_background_events().await;

    ctx.master.reconfigure(MasterConfig::default());
    ctx.process_background_events().await;

    assert_eq!(handle.await.unwrap(), Err(SubstantiationError::Aborted(WorkerName::new("cloud"))));
    assert_eq!(ctx.provisioner.stops(), vec![true]);
}

#[tokio::test]
async fn changing_worker_kind_replaces_it() {
    let mut ctx = setup_workers(vec![WorkerConfig::builder().name("w1").build()]);
    let connection = ctx.connect("w1").await;

    ctx.master.reconfigure(MasterConfig {
        locks: Vec::new(),
        workers: vec![latent_worker("w1", Some(Duration::from_secs(600)))],
    });
    ctx.process_background_events().await;

    assert_eq!(connection.close_requests(), 1);
    let status = ctx.status("w1");
    assert_eq!(status.connection, ConnectionState::Disconnected);
    assert_eq!(status.substantiation, Some(SubstantiationState::Insubstantiated));
}

#[tokio::test]
async fn provisioner_change_waits_for_instance_to_stop() {
    let mut ctx = setup_workers(vec![latent_worker("cloud", Some(Duration::from_secs(600)))]);
    bring_up(&mut ctx, "cloud").await;

    let changed = WorkerConfig::builder()
        .name("cloud")
        .latent(LatentConfig::new(ProvisionerConfig::command("up --v2", "down --v2")))
        .build();
    ctx.master.reconfigure(MasterConfig { locks: Vec::new(), workers: vec![changed] });
    let pending = |ctx: &TestContext| {
        ctx.master.inner.state.lock().workers["cloud"]
            .latent()
            .is_some_and(|latent| latent.pending_provisioner.is_some())
    };
    assert!(pending(&ctx));

    ctx.master.insubstantiate("cloud").unwrap();
    ctx.process_background_events().await;
    assert!(!pending(&ctx));
}

#[tokio::test]
async fn unchanged_lock_keeps_its_holders() {
    let lock = repo(1);
    let mut ctx = setup(two_workers(&lock));
    ctx.connect("w1").await;
    ctx.connect("w2").await;
    let _lease = ctx.master.start_build(BuildRequest::new("build", "w1")).await.unwrap();

    ctx.master.reconfigure(two_workers(&lock));
    assert!(!ctx.master.can_admit_build("w2", "build"));
}

#[tokio::test]
async fn new_lock_limit_is_a_new_lock() {
    let mut ctx = setup(two_workers(&repo(1)));
    ctx.connect("w1").await;
    ctx.connect("w2").await;
    let old = ctx.master.start_build(BuildRequest::new("build", "w1")).await.unwrap();

    ctx.master.reconfigure(two_workers(&repo(2)));
    let new = ctx.master.start_build(BuildRequest::new("build", "w2")).await.unwrap();
    assert_eq!(new.locks()[0].0, LockKey::master(repo(2)));
    assert_eq!(ctx.master.inner.state.lock().broker.len(), 2);

    // The old lock is dropped once nobody uses it
    old.finish();
    ctx.master.reconfigure(two_workers(&repo(2)));
    assert_eq!(ctx.master.inner.state.lock().broker.len(), 1);
}
