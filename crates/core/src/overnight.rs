// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overnight-run records: a labeled batch of tasks with error budgets and
//! drain support. Only one run may be active at a time.

use crate::id::{RunId, TaskId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvernightRun {
    pub run_id: RunId,
    pub status: RunStatus,
    pub task_ids: Vec<TaskId>,
    #[serde(default)]
    pub tasks_completed: Vec<TaskId>,
    #[serde(default)]
    pub tasks_failed: Vec<TaskId>,
    #[serde(default)]
    pub tasks_in_progress: Vec<TaskId>,
    #[serde(default)]
    pub total_errors: u32,
    #[serde(default)]
    pub drain_requested: bool,
    /// ISO-8601 UTC, set when drain was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_requested_at: Option<String>,
    /// ISO-8601 UTC.
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub updated_at: String,
}

impl OvernightRun {
    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Active
    }

    /// Tasks not yet completed, failed, or in progress.
    pub fn remaining(&self) -> Vec<&TaskId> {
        self.task_ids
            .iter()
            .filter(|t| {
                !self.tasks_completed.contains(t)
                    && !self.tasks_failed.contains(t)
                    && !self.tasks_in_progress.contains(t)
            })
            .collect()
    }
}

/// Per-task error tracking inside an overnight run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskErrorState {
    pub task_id: TaskId,
    pub consecutive_errors: u32,
    #[serde(default)]
    pub over_budget: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: String,
}

/// Morning-report aggregation for a completed (or draining) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorningReport {
    pub run_id: RunId,
    pub completed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    pub skipped_over_budget: Vec<TaskId>,
    pub total_errors: u32,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub commits: Vec<String>,
    pub outstanding_human_escalations: u64,
    pub generated_at: String,
}

#[cfg(test)]
#[path = "overnight_tests.rs"]
mod tests;
