// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn fake_records_calls() {
    let adapter = FakeNotifyAdapter::new();
    adapter.send("subject", "body", &["ops@example.com".to_string()]).await.unwrap();

    let calls = adapter.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].subject, "subject");
    assert_eq!(calls[0].body, "body");
    assert_eq!(calls[0].recipients, vec!["ops@example.com".to_string()]);
}

#[tokio::test]
async fn failing_fake_still_records() {
    let adapter = FakeNotifyAdapter::failing();
    assert!(adapter.send("s", "b", &[]).await.is_err());
    assert_eq!(adapter.calls().len(), 1);
}

#[tokio::test]
async fn log_adapter_never_fails() {
    LogNotifyAdapter.send("s", "b", &["a".to_string(), "b".to_string()]).await.unwrap();
}
