// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    bugfix = { "fix crash when saving empty file", TaskKind::Bugfix },
    refactor = { "refactor the session module into two files", TaskKind::Refactor },
    test = { "add tests for cursor recovery", TaskKind::Test },
    docs = { "update readme with new CLI docs", TaskKind::Docs },
    infra = { "speed up ci build pipeline", TaskKind::Infra },
    feature_fallback = { "add dark mode toggle", TaskKind::Feature },
)]
fn classification_buckets(text: &str, expected: TaskKind) {
    assert_eq!(classify_task(text), expected);
}

#[test]
fn classification_picks_strongest_bucket() {
    // two bugfix words beat one docs word
    assert_eq!(
        classify_task("fix the bug in the docs generator"),
        TaskKind::Bugfix
    );
}

#[test]
fn keywords_dedupe_and_drop_short_words() {
    let kw = task_keywords("Fix the fix for the bus bus reader");
    assert_eq!(kw, vec!["reader"]);
}

#[test]
fn pattern_score_is_keyword_overlap() {
    let pattern = DecompositionPattern {
        keywords: vec!["cursor".into(), "recovery".into(), "compaction".into()],
        kind: TaskKind::Bugfix,
        subtasks: vec!["a".into(), "b".into()],
        success_rate: 0.9,
        uses: 4,
        updated_at: String::new(),
    };
    assert_eq!(pattern.score("fix cursor recovery after crash"), 2.0 / 3.0);
    assert_eq!(pattern.score("unrelated"), 0.0);
}

#[test]
fn empty_pattern_scores_zero() {
    let pattern = DecompositionPattern {
        keywords: vec![],
        kind: TaskKind::Feature,
        subtasks: vec![],
        success_rate: 0.0,
        uses: 0,
        updated_at: String::new(),
    };
    assert_eq!(pattern.score("anything"), 0.0);
}
