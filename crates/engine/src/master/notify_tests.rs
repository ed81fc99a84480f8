// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_core::{Clock, FakeClock, WorkerConfig, WorkerName};
use std::time::Duration;

fn proxy() -> WorkerProxy {
    WorkerProxy::new(
        WorkerConfig::builder()
            .name("w1")
            .missing_timeout(Duration::from_secs(60))
            .notify_on_missing(vec!["ops@example.com".into()])
            .build(),
        None,
    )
}

#[test]
fn missing_message_has_timeline_and_info() {
    let clock = FakeClock::new();
    let mut proxy = proxy();
    proxy.last_connected = Some(clock.utc());
    clock.advance(Duration::from_secs(3600));
    proxy.last_disconnected = Some(clock.utc());
    proxy.info.admin = Some("Jo <jo@example.com>".into());
    clock.advance(Duration::from_secs(60));

    let (subject, body) = missing_worker(&proxy, clock.utc());
    assert_eq!(subject, "worker w1 missing");
    assert!(body.contains("It connected at 2023-11-14 22:13:20 UTC"));
    assert!(body.contains("and disconnected at 2023-11-14 23:13:20 UTC."));
    assert!(body.contains("at least 60 seconds"));
    assert!(body.contains("is: Jo <jo@example.com>"));
    assert!(body.contains("Host: unknown"));
}

#[test]
fn missing_message_for_never_connected_worker() {
    let clock = FakeClock::new();
    let (_, body) = missing_worker(&proxy(), clock.utc());
    assert!(body.contains("has not connected since the master started"));
}

#[test]
fn never_substantiated_message_names_the_error() {
    let clock = FakeClock::new();
    let since = clock.utc();
    clock.advance(Duration::from_secs(1200));
    let error = SubstantiationError::Timeout {
        worker: WorkerName::new("w1"),
        timeout: Duration::from_secs(1200),
    };

    let (subject, body) = never_substantiated(&proxy(), &error, Some(since), clock.utc());
    assert_eq!(subject, "latent worker w1 never substantiated");
    assert!(body.contains("Substantiation started at 2023-11-14 22:13:20 UTC"));
    assert!(body.contains("given up at 2023-11-14 22:33:20 UTC"));
    assert!(body.contains("Reason: worker 'w1' did not attach within 1200s"));
}
