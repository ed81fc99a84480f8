// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod reconfigure;
mod shutdown;

use super::*;
use crate::test_helpers::{latent_worker, setup, setup_workers, TestContext};
use crate::worker::ConnectionState;
use bm_adapters::{FakeConnection, StartContext};
use std::time::Duration;

/// Substantiate `worker` and attach it, returning the connection.
async fn bring_up(ctx: &mut TestContext, worker: &str) -> FakeConnection {
    let master = ctx.master.clone();
    let name = WorkerName::new(worker);
    let handle = tokio::spawn(async move { master.substantiate(name.as_str(), StartContext::new(name.clone())).await });
    ctx.process_background_events().await;
    let connection = ctx.connect(worker).await;
    handle.await.unwrap().unwrap();
    connection
}

fn watched(name: &str) -> WorkerConfig {
    WorkerConfig::builder()
        .name(name)
        .missing_timeout(Duration::from_secs(30))
        .notify_on_missing(vec!["ops@example.com".into()])
        .build()
}

#[tokio::test]
async fn tick_fires_only_due_timers() {
    let mut ctx = setup_workers(vec![watched("w1")]);
    assert_eq!(ctx.master.tick(), 0);
    assert_eq!(ctx.master.next_deadline(), Some(ctx.clock.now() + Duration::from_secs(30)));

    ctx.clock.advance(Duration::from_secs(30));
    assert_eq!(ctx.master.tick(), 1);
    assert_eq!(ctx.master.tick(), 0);
    assert_eq!(ctx.master.next_deadline(), None);
    ctx.process_background_events().await;
    assert_eq!(ctx.notifier.calls().len(), 1);
}

#[tokio::test]
async fn worker_never_seen_is_reported_missing() {
    let mut ctx = setup_workers(vec![watched("w1")]);
    ctx.advance(Duration::from_secs(30)).await;

    let calls = ctx.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].body.contains("has not connected since the master started"));
}

#[tokio::test]
async fn status_reports_connection_and_slots() {
    let mut ctx = setup_workers(vec![WorkerConfig::builder().name("w1").build()]);
    let status = ctx.status("w1");
    assert_eq!(status.connection, ConnectionState::Disconnected);
    assert_eq!(status.substantiation, None);
    assert_eq!(status.slots.len(), 1);

    ctx.connect("w1").await;
    assert_eq!(ctx.status("w1").connection, ConnectionState::Connected);
    assert_eq!(ctx.master.worker_names(), vec![WorkerName::new("w1")]);
    assert!(ctx.master.worker_status("ghost").is_none());
}
