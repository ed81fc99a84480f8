// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    with_recipients      = { vec!["ops@example.com"], 60, true },
    no_recipients        = { vec![],                  60, false },
    zero_timeout         = { vec!["ops@example.com"], 0,  false },
)]
fn missing_timer_rule(recipients: Vec<&str>, timeout_secs: u64, expected: bool) {
    let config = WorkerConfig::builder()
        .notify_on_missing(recipients.into_iter().map(String::from).collect())
        .missing_timeout(Duration::from_secs(timeout_secs))
        .build();
    assert_eq!(config.wants_missing_timer(), expected);
}

#[test]
fn latent_config_defaults() {
    let latent = LatentConfig::new(ProvisionerConfig::command("up", "down"));
    assert_eq!(latent.build_wait_timeout, Some(DEFAULT_BUILD_WAIT_TIMEOUT));
    assert_eq!(latent.substantiation_timeout, DEFAULT_SUBSTANTIATION_TIMEOUT);
    assert_eq!(latent.start_retry_backoff, None);
}

#[test]
fn latent_builder_marks_worker_latent() {
    let config = WorkerConfig::builder()
        .latent(LatentConfig::new(ProvisionerConfig::command("up", "down")).build_wait_timeout(None))
        .build();
    assert!(config.is_latent());
    assert_eq!(config.latent.unwrap().build_wait_timeout, None);
}

#[test]
fn provisioner_config_deserializes_tagged() {
    let config: ProvisionerConfig =
        toml::from_str("type = \"command\"\nstart = \"./up.sh\"\nstop = \"./down.sh\"\n").unwrap();
    assert_eq!(
        config,
        ProvisionerConfig::Command {
            start: "./up.sh".to_string(),
            stop: "./down.sh".to_string(),
            timeout_secs: 300,
        }
    );
}

#[test]
fn worker_name_borrows_as_str() {
    let mut map = std::collections::HashMap::new();
    map.insert(WorkerName::new("w1"), 1);
    assert_eq!(map.get("w1"), Some(&1));
}
