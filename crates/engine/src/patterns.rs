// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decomposition-pattern library.
//!
//! A keyed store of prior successful task breakdowns. Lookups score by
//! keyword overlap; recording either appends or EMA-updates an existing
//! entry, then prunes to the best N per task kind.

use crate::paths::StateTree;
use crate::EngineError;
use indexmap::IndexMap;
use pilot_core::clock::Clock;
use pilot_core::patterns::{classify_task, task_keywords, DecompositionPattern, TaskKind};
use pilot_bus::fsio::{atomic_write_json, read_json};
use serde::{Deserialize, Serialize};

/// EMA weight for new outcomes.
const EMA_ALPHA: f64 = 0.3;

/// Default score floor for a usable match.
pub const DEFAULT_MIN_SCORE: f64 = 0.4;

/// Patterns kept per task kind after pruning.
pub const MAX_PER_KIND: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Library {
    /// kind name → patterns, insertion-ordered.
    kinds: IndexMap<String, Vec<DecompositionPattern>>,
    #[serde(default)]
    updated_at: String,
}

pub struct PatternLibrary<C: Clock> {
    tree: StateTree,
    clock: C,
    min_score: f64,
}

impl<C: Clock> PatternLibrary<C> {
    pub fn new(tree: StateTree, clock: C) -> Self {
        Self {
            tree,
            clock,
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    fn load(&self) -> Library {
        read_json(&self.tree.pattern_library_file())
            .unwrap_or_default()
            .unwrap_or_default()
    }

    fn store(&self, mut library: Library) -> Result<(), EngineError> {
        library.updated_at = self.clock.now_iso();
        atomic_write_json(&self.tree.pattern_library_file(), &library)?;
        Ok(())
    }

    /// The best prior decomposition for this task text, if it scores at or
    /// above the floor.
    pub fn find_pattern(&self, text: &str) -> Option<DecompositionPattern> {
        let kind = classify_task(text);
        let library = self.load();
        let patterns = library.kinds.get(kind.name())?;
        patterns
            .iter()
            .map(|p| (p.score(text), p))
            .filter(|(score, _)| *score >= self.min_score)
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, p)| p.clone())
    }

    /// Record an attempt's outcome. Matching an existing pattern updates
    /// its success rate with an EMA (α = 0.3); otherwise a new entry is
    /// appended. The kind bucket is then pruned to [`MAX_PER_KIND`] by
    /// success rate, then usage count.
    pub fn record_pattern(
        &self,
        text: &str,
        subtasks: Vec<String>,
        success: bool,
    ) -> Result<(), EngineError> {
        let kind = classify_task(text);
        let outcome = if success { 1.0 } else { 0.0 };
        let mut library = self.load();
        let bucket = library.kinds.entry(kind.name().to_string()).or_default();

        let keywords = task_keywords(text);
        let existing = bucket
            .iter_mut()
            .map(|p| (p.score(text), p))
            .filter(|(score, _)| *score >= self.min_score)
            .max_by(|(a, _), (b, _)| a.total_cmp(b));

        match existing {
            Some((_, pattern)) => {
                pattern.success_rate =
                    pattern.success_rate * (1.0 - EMA_ALPHA) + outcome * EMA_ALPHA;
                pattern.uses += 1;
                pattern.subtasks = subtasks;
                pattern.updated_at = self.clock.now_iso();
            }
            None => {
                bucket.push(DecompositionPattern {
                    keywords,
                    kind,
                    subtasks,
                    success_rate: outcome,
                    uses: 1,
                    updated_at: self.clock.now_iso(),
                });
            }
        }

        bucket.sort_by(|a, b| {
            b.success_rate
                .total_cmp(&a.success_rate)
                .then(b.uses.cmp(&a.uses))
        });
        bucket.truncate(MAX_PER_KIND);

        self.store(library)
    }

    /// Pattern count per kind, for reporting.
    pub fn counts(&self) -> Vec<(TaskKind, usize)> {
        let library = self.load();
        TaskKind::all()
            .iter()
            .filter_map(|kind| {
                library
                    .kinds
                    .get(kind.name())
                    .map(|bucket| (*kind, bucket.len()))
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "patterns_tests.rs"]
mod tests;
