// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn shutdown_stops_every_live_instance() {
    let mut ctx = setup_workers(vec![
        latent_worker("a", Some(Duration::from_secs(600))),
        latent_worker("b", Some(Duration::from_secs(600))),
        latent_worker("idle", Some(Duration::from_secs(600))),
    ]);
    let a = bring_up(&mut ctx, "a").await;
    bring_up(&mut ctx, "b").await;

    ctx.master.shutdown().await;

    assert_eq!(ctx.provisioner.stops(), vec![true, true]);
    assert_eq!(a.close_requests(), 1);
    assert_eq!(ctx.master.next_deadline(), None);
}

#[tokio::test]
async fn shutdown_leaves_always_on_workers_alone() {
    let mut ctx = setup_workers(vec![watched("w1")]);
    let connection = ctx.connect("w1").await;

    ctx.master.shutdown().await;

    assert_eq!(connection.close_requests(), 0);
    assert!(ctx.provisioner.stops().is_empty());
}
