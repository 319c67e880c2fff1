// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-context status board and service discovery.
//!
//! The board is one shared JSON file keyed by session id. Discovery maps a
//! file path to the best-owning role via glob patterns: `**` spans
//! segments, `*` stays within one, literal segments and extensions score
//! higher, exclusion patterns veto.

use crate::paths::StateTree;
use crate::EngineError;
use globset::{Glob, GlobMatcher};
use pilot_bus::fsio::{atomic_write_json, read_json};
use pilot_core::board::{AgentRegistryEntry, AgentStatus};
use pilot_core::clock::Clock;
use pilot_core::id::SessionId;
use std::collections::BTreeMap;

/// A discovery hit: the owning role and how specifically it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleMatch {
    pub role: String,
    pub pattern: String,
    pub score: i64,
}

pub struct StatusBoard<C: Clock> {
    tree: StateTree,
    clock: C,
}

impl<C: Clock> StatusBoard<C> {
    pub fn new(tree: StateTree, clock: C) -> Self {
        Self { tree, clock }
    }

    fn load(&self) -> BTreeMap<String, AgentStatus> {
        read_json(&self.tree.status_board_file())
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    fn store(&self, board: &BTreeMap<String, AgentStatus>) -> Result<(), EngineError> {
        atomic_write_json(&self.tree.status_board_file(), board)?;
        Ok(())
    }

    /// Publish one agent's current task, step, and touched files.
    pub fn publish(&self, mut status: AgentStatus) -> Result<(), EngineError> {
        status.updated_at = self.clock.now_iso();
        let mut board = self.load();
        board.insert(status.session_id.to_string(), status);
        self.store(&board)
    }

    /// Drop an agent's entry on session end.
    pub fn remove(&self, session_id: &SessionId) -> Result<(), EngineError> {
        let mut board = self.load();
        if board.remove(session_id.as_str()).is_some() {
            self.store(&board)?;
        }
        Ok(())
    }

    pub fn all(&self) -> Vec<AgentStatus> {
        self.load().into_values().collect()
    }

    /// Agents whose touched files intersect `files`.
    pub fn query_by_file_overlap(&self, files: &[String]) -> Vec<AgentStatus> {
        self.load()
            .into_values()
            .filter(|status| status.files_touched.iter().any(|f| files.contains(f)))
            .collect()
    }
}

/// Role registry: capabilities and file-pattern ownership per role.
pub struct AgentRegistry {
    entries: Vec<AgentRegistryEntry>,
}

impl AgentRegistry {
    pub fn new(entries: Vec<AgentRegistryEntry>) -> Self {
        Self { entries }
    }

    /// Load from `state/orchestrator/agent-registry.json`; missing file
    /// means an empty registry.
    pub fn load(tree: &StateTree) -> Self {
        let entries = read_json(&tree.agent_registry_file())
            .ok()
            .flatten()
            .unwrap_or_default();
        Self { entries }
    }

    pub fn save(&self, tree: &StateTree) -> Result<(), EngineError> {
        atomic_write_json(&tree.agent_registry_file(), &self.entries)?;
        Ok(())
    }

    pub fn entries(&self) -> &[AgentRegistryEntry] {
        &self.entries
    }

    /// Roles carrying a capability.
    pub fn query_by_capability(&self, capability: &str) -> Vec<&AgentRegistryEntry> {
        self.entries
            .iter()
            .filter(|e| e.capabilities.iter().any(|c| c == capability))
            .collect()
    }

    /// The best-matching role for a path: highest specificity among
    /// matching include patterns, with exclusion patterns vetoing the
    /// whole role.
    pub fn discover_role_for_path(&self, path: &str) -> Option<RoleMatch> {
        let mut best: Option<RoleMatch> = None;
        for entry in &self.entries {
            if entry
                .exclude_patterns
                .iter()
                .any(|p| glob_matches(p, path))
            {
                continue;
            }
            for pattern in &entry.file_patterns {
                if !glob_matches(pattern, path) {
                    continue;
                }
                let score = pattern_specificity(pattern);
                let better = match &best {
                    Some(current) => score > current.score,
                    None => true,
                };
                if better {
                    best = Some(RoleMatch {
                        role: entry.role.clone(),
                        pattern: pattern.clone(),
                        score,
                    });
                }
            }
        }
        best
    }
}

fn glob_matches(pattern: &str, path: &str) -> bool {
    match compile(pattern) {
        Some(matcher) => matcher.is_match(path),
        None => false,
    }
}

fn compile(pattern: &str) -> Option<GlobMatcher> {
    Glob::new(pattern).ok().map(|g| g.compile_matcher())
}

/// Specificity: literal segments score highest, single-segment wildcards a
/// little, `**` nothing; a literal file extension adds a bonus.
fn pattern_specificity(pattern: &str) -> i64 {
    let mut score = 0;
    for segment in pattern.split('/') {
        if segment == "**" {
            continue;
        } else if segment.contains('*') || segment.contains('?') {
            score += 3;
        } else {
            score += 10;
        }
    }
    if let Some(last) = pattern.rsplit('/').next() {
        if let Some((_, ext)) = last.rsplit_once('.') {
            if !ext.is_empty() && !ext.contains('*') && !ext.contains('?') {
                score += 5;
            }
        }
    }
    score
}

#[cfg(test)]
#[path = "board_tests.rs"]
mod tests;
