// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;

#[test]
fn session_id_generate_format() {
    let id = SessionId::generate();
    assert!(id.as_str().starts_with("S-"));
    assert_eq!(id.as_str().len(), 2 + 8);
}

#[test]
fn message_id_generate_sorts_by_time() {
    let clock = FakeClock::new();
    let a = crate::id::MessageId::generate(&clock);
    clock.advance_ms(10_000);
    let b = crate::id::MessageId::generate(&clock);
    // Base-36 timestamps of equal width compare lexicographically
    assert!(a.as_str() < b.as_str());
}

#[test]
fn base36_zero() {
    assert_eq!(base36(0), "0");
}

#[test]
fn base36_round_values() {
    assert_eq!(base36(35), "z");
    assert_eq!(base36(36), "10");
    assert_eq!(base36(36 * 36), "100");
}

#[test]
fn short_truncates() {
    let id = SessionId::new("S-abcdefgh");
    assert_eq!(id.short(4), "S-ab");
    assert_eq!(id.short(100), "S-abcdefgh");
}

#[test]
fn sequential_id_gen() {
    let idgen = SequentialIdGen::new("sess");
    assert_eq!(idgen.next(), "sess-1");
    assert_eq!(idgen.next(), "sess-2");
}

#[test]
fn uuid_id_gen_unique() {
    let idgen = UuidIdGen;
    assert_ne!(idgen.next(), idgen.next());
}

#[test]
fn id_serde_is_plain_string() {
    let id = TaskId::new("T-42");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"T-42\"");
    let parsed: TaskId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn id_borrow_str_lookup() {
    use std::collections::HashMap;
    let mut map: HashMap<SessionId, u32> = HashMap::new();
    map.insert(SessionId::new("S-1"), 7);
    assert_eq!(map.get("S-1"), Some(&7));
}
