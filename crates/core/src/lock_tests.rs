// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn structurally_equal_identifiers_are_equal() {
    let a = LockIdentifier::worker("compile", 2).with_worker_max_count("big", 4);
    let b = LockIdentifier::worker("compile", 2).with_worker_max_count("big", 4);
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
}

#[yare::parameterized(
    different_count = { LockIdentifier::master("repo", 3) },
    different_scope = { LockIdentifier::worker("repo", 2) },
    different_name  = { LockIdentifier::master("repo2", 2) },
    with_override   = { LockIdentifier::master("repo", 2).with_worker_max_count("w", 1) },
)]
fn any_field_change_is_a_different_identifier(other: LockIdentifier) {
    assert_ne!(LockIdentifier::master("repo", 2), other);
}

#[test]
fn per_worker_override_falls_back_to_default() {
    let id = LockIdentifier::worker("compile", 2).with_worker_max_count("big", 4);
    assert_eq!(id.max_count_for("big"), 4);
    assert_eq!(id.max_count_for("small"), 2);
}

#[yare::parameterized(
    counting  = { "counting", AccessMode::Counting },
    exclusive = { "exclusive", AccessMode::Exclusive },
)]
fn access_mode_round_trips_through_display(text: &str, mode: AccessMode) {
    assert_eq!(text.parse::<AccessMode>().unwrap(), mode);
    assert_eq!(mode.to_string(), text);
}

#[yare::parameterized(
    capitalized = { "Counting" },
    shared      = { "shared" },
    empty       = { "" },
)]
fn access_mode_rejects_unknown_strings(text: &str) {
    assert_eq!(text.parse::<AccessMode>(), Err(ParseAccessModeError(text.to_string())));
}

#[test]
fn access_mode_deserialization_is_closed() {
    let ok: AccessMode = serde_json::from_str("\"exclusive\"").unwrap();
    assert_eq!(ok, AccessMode::Exclusive);
    assert!(serde_json::from_str::<AccessMode>("\"shared\"").is_err());
}
