// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const FULL: &str = r#"
[[lock]]
name = "repo"
max_count = 2

[[lock]]
name = "compile"
max_count = 1
scope = "worker"
per_worker_max_count = { big = 4 }

[[worker]]
name = "linux-1"
password = "secret"
max_builds = 2
missing_timeout = 120
notify_on_missing = ["ops@example.com"]
builders = ["build", "test"]
locks = [{ lock = "repo", mode = "exclusive" }, { lock = "compile" }]

[[worker]]
name = "cloud-1"
builders = ["build"]

[worker.latent]
build_wait_timeout = -1
substantiation_timeout = 300
start_retry_backoff = 30
provisioner = { type = "command", start = "./up.sh", stop = "./down.sh" }
"#;

#[test]
fn parses_full_document() {
    let config = MasterConfig::parse(FULL).unwrap();
    assert_eq!(config.locks.len(), 2);
    assert_eq!(config.locks[0], LockIdentifier::master("repo", 2));
    assert_eq!(config.locks[1], LockIdentifier::worker("compile", 1).with_worker_max_count("big", 4));

    let linux = config.worker("linux-1").unwrap();
    assert_eq!(linux.max_builds, Some(2));
    assert_eq!(linux.missing_timeout, Duration::from_secs(120));
    assert_eq!(linux.locks[0], LockIdentifier::master("repo", 2).exclusive());
    assert_eq!(linux.locks[1].mode, AccessMode::Counting);
    assert!(!linux.is_latent());

    let cloud = config.worker("cloud-1").unwrap();
    let latent = cloud.latent.as_ref().unwrap();
    assert_eq!(latent.build_wait_timeout, None);
    assert_eq!(latent.substantiation_timeout, Duration::from_secs(300));
    assert_eq!(latent.start_retry_backoff, Some(Duration::from_secs(30)));
    assert_eq!(cloud.missing_timeout, DEFAULT_MISSING_TIMEOUT);
}

#[test]
fn reparsing_yields_equal_lock_identifiers() {
    let a = MasterConfig::parse(FULL).unwrap();
    let b = MasterConfig::parse(FULL).unwrap();
    assert_eq!(a.locks, b.locks);
    assert_eq!(a.workers[0].locks, b.workers[0].locks);
}

#[test]
fn latent_defaults_apply_when_omitted() {
    let config = MasterConfig::parse(
        r#"
[[worker]]
name = "cloud"
[worker.latent]
provisioner = { type = "command", start = "a", stop = "b" }
"#,
    )
    .unwrap();
    let latent = config.workers[0].latent.as_ref().unwrap();
    assert_eq!(latent.build_wait_timeout, Some(DEFAULT_BUILD_WAIT_TIMEOUT));
    assert_eq!(latent.substantiation_timeout, DEFAULT_SUBSTANTIATION_TIMEOUT);
}

#[yare::parameterized(
    duplicate_worker = { "[[worker]]\nname = \"a\"\n[[worker]]\nname = \"a\"\n" },
    duplicate_lock   = { "[[lock]]\nname = \"l\"\n[[lock]]\nname = \"l\"\n" },
    zero_max_count   = { "[[lock]]\nname = \"l\"\nmax_count = 0\n" },
    zero_override    = { "[[lock]]\nname = \"l\"\nscope = \"worker\"\nper_worker_max_count = { w = 0 }\n" },
    master_override  = { "[[lock]]\nname = \"l\"\nper_worker_max_count = { w = 2 }\n" },
    unknown_lock     = { "[[worker]]\nname = \"a\"\nlocks = [{ lock = \"nope\" }]\n" },
    bad_mode         = { "[[lock]]\nname = \"l\"\n[[worker]]\nname = \"a\"\nlocks = [{ lock = \"l\", mode = \"shared\" }]\n" },
    bad_scope        = { "[[lock]]\nname = \"l\"\nscope = \"global\"\n" },
    zero_max_builds  = { "[[worker]]\nname = \"a\"\nmax_builds = 0\n" },
    empty_worker     = { "[[worker]]\nname = \"\"\n" },
    unknown_field    = { "[[worker]]\nname = \"a\"\nflavour = \"x\"\n" },
)]
fn invalid_documents_are_rejected(text: &str) {
    assert!(MasterConfig::parse(text).is_err());
}

#[test]
fn unknown_lock_error_names_worker_and_lock() {
    let err = MasterConfig::parse("[[worker]]\nname = \"a\"\nlocks = [{ lock = \"nope\" }]\n")
        .unwrap_err();
    assert_eq!(err.to_string(), "worker 'a' references unknown lock 'nope'");
}
