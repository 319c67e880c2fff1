// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status-board and agent-registry records.
//!
//! The status board is one shared JSON file keyed by session id, holding
//! each agent's current task, step, and files touched. The agent registry
//! maps roles to capabilities and file-pattern globs for discovery.

use crate::id::{SessionId, TaskId};
use serde::{Deserialize, Serialize};

/// One agent's current activity, published to the shared board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub session_id: SessionId,
    pub agent_name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default)]
    pub files_touched: Vec<String>,
    pub updated_at: String,
}

/// Registry entry mapping one role to its capabilities and file patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistryEntry {
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Globs the role owns. `**` spans segments, `*` stays within one.
    #[serde(default)]
    pub file_patterns: Vec<String>,
    /// Globs the role explicitly does not own; a match here vetoes.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[cfg(test)]
#[path = "board_tests.rs"]
mod tests;
