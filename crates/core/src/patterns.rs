// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decomposition-pattern records: prior successful task breakdowns,
//! classified by keyword buckets and scored for reuse.

use serde::{Deserialize, Serialize};

/// Keyword buckets for task classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Feature,
    Bugfix,
    Refactor,
    Test,
    Docs,
    Infra,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Feature => "feature",
            TaskKind::Bugfix => "bugfix",
            TaskKind::Refactor => "refactor",
            TaskKind::Test => "test",
            TaskKind::Docs => "docs",
            TaskKind::Infra => "infra",
        }
    }

    pub fn all() -> [TaskKind; 6] {
        [
            TaskKind::Feature,
            TaskKind::Bugfix,
            TaskKind::Refactor,
            TaskKind::Test,
            TaskKind::Docs,
            TaskKind::Infra,
        ]
    }
}

const BUCKETS: &[(TaskKind, &[&str])] = &[
    (
        TaskKind::Bugfix,
        &["fix", "bug", "crash", "regression", "broken", "error"],
    ),
    (
        TaskKind::Refactor,
        &["refactor", "cleanup", "restructure", "rename", "extract", "simplify"],
    ),
    (
        TaskKind::Test,
        &["test", "tests", "coverage", "spec", "assertion"],
    ),
    (
        TaskKind::Docs,
        &["doc", "docs", "readme", "documentation", "comment"],
    ),
    (
        TaskKind::Infra,
        &["ci", "build", "deploy", "docker", "pipeline", "infra", "release"],
    ),
];

/// Classify free task text into a bucket. Falls back to `Feature`, the
/// broadest bucket, when nothing matches.
pub fn classify_task(text: &str) -> TaskKind {
    let lower = text.to_ascii_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let mut best: Option<(TaskKind, usize)> = None;
    for (kind, keywords) in BUCKETS {
        let hits = words.iter().filter(|w| keywords.contains(*w)).count();
        if hits > 0 && best.map(|(_, b)| hits > b).unwrap_or(true) {
            best = Some((*kind, hits));
        }
    }
    best.map(|(k, _)| k).unwrap_or(TaskKind::Feature)
}

/// One stored decomposition: the subtask split that worked for a prior task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionPattern {
    /// Normalized keywords of the originating task.
    pub keywords: Vec<String>,
    pub kind: TaskKind,
    pub subtasks: Vec<String>,
    /// Exponential moving average of outcomes (1.0 success, 0.0 failure).
    pub success_rate: f64,
    pub uses: u64,
    pub updated_at: String,
}

impl DecompositionPattern {
    /// Overlap score in `[0, 1]` between this pattern and task text.
    pub fn score(&self, text: &str) -> f64 {
        if self.keywords.is_empty() {
            return 0.0;
        }
        let lower = text.to_ascii_lowercase();
        let hits = self
            .keywords
            .iter()
            .filter(|k| lower.contains(k.as_str()))
            .count();
        hits as f64 / self.keywords.len() as f64
    }
}

/// Extract the significant keywords of task text (lowercased, deduplicated,
/// short stop-words removed).
pub fn task_keywords(text: &str) -> Vec<String> {
    let lower = text.to_ascii_lowercase();
    let mut out: Vec<String> = Vec::new();
    for word in lower.split(|c: char| !c.is_ascii_alphanumeric()) {
        if word.len() < 4 {
            continue;
        }
        if !out.iter().any(|w| w == word) {
            out.push(word.to_string());
        }
    }
    out
}

#[cfg(test)]
#[path = "patterns_tests.rs"]
mod tests;
