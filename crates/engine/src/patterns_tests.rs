// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pilot_core::clock::FakeClock;

fn fixture() -> (tempfile::TempDir, PatternLibrary<FakeClock>) {
    let dir = tempfile::tempdir().unwrap();
    let library = PatternLibrary::new(StateTree::under_repo(dir.path()), FakeClock::new());
    (dir, library)
}

#[test]
fn empty_library_finds_nothing() {
    let (_dir, library) = fixture();
    assert!(library.find_pattern("fix cursor recovery bug").is_none());
}

#[test]
fn record_then_find() {
    let (_dir, library) = fixture();
    library
        .record_pattern(
            "fix cursor recovery after compaction bug",
            vec!["reproduce".into(), "patch".into(), "test".into()],
            true,
        )
        .unwrap();

    let hit = library
        .find_pattern("another cursor recovery compaction bug to fix")
        .expect("pattern found");
    assert_eq!(hit.subtasks.len(), 3);
    assert_eq!(hit.kind, TaskKind::Bugfix);
    assert_eq!(hit.success_rate, 1.0);
}

#[test]
fn lookup_respects_kind_buckets() {
    let (_dir, library) = fixture();
    library
        .record_pattern("fix cursor recovery bug", vec!["a".into()], true)
        .unwrap();
    // Same keywords but classified refactor: different bucket
    assert!(library
        .find_pattern("refactor cursor recovery module")
        .is_none());
}

#[test]
fn ema_updates_existing_pattern() {
    let (_dir, library) = fixture();
    let text = "fix flaky bus watcher bug";
    library.record_pattern(text, vec!["a".into()], true).unwrap();
    library.record_pattern(text, vec!["a".into()], false).unwrap();

    let hit = library.find_pattern(text).unwrap();
    // 1.0 * 0.7 + 0.0 * 0.3
    assert!((hit.success_rate - 0.7).abs() < 1e-9);
    assert_eq!(hit.uses, 2);

    library.record_pattern(text, vec!["a".into()], true).unwrap();
    let hit = library.find_pattern(text).unwrap();
    // 0.7 * 0.7 + 1.0 * 0.3
    assert!((hit.success_rate - 0.79).abs() < 1e-9);
}

#[test]
fn score_floor_filters_weak_matches() {
    let (_dir, library) = fixture();
    library
        .record_pattern(
            "fix cursor recovery compaction archive boundary bug",
            vec!["a".into()],
            true,
        )
        .unwrap();
    // One keyword of several: too weak at the default floor
    assert!(library.find_pattern("fix login bug with cursor").is_none());
}

#[test]
fn prunes_to_top_n_by_success_then_uses() {
    let (_dir, library) = fixture();
    // Overfill one bucket with distinct patterns
    for i in 0..(MAX_PER_KIND + 10) {
        let success = i % 2 == 0;
        library
            .record_pattern(
                &format!("fix defect alpha{i:03} beta{i:03} gamma{i:03}"),
                vec!["step".into()],
                success,
            )
            .unwrap();
    }
    let counts = library.counts();
    let bugfix = counts
        .iter()
        .find(|(kind, _)| *kind == TaskKind::Bugfix)
        .map(|(_, n)| *n)
        .unwrap();
    assert_eq!(bugfix, MAX_PER_KIND);
}
