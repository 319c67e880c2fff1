// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer-review gates and quality-gate verdicts.

use crate::id::TaskId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    Rejected,
}

/// One task's review gate, written by auto-review and consulted by the PM
/// before advancing a merge task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewGate {
    pub task_id: TaskId,
    pub reviewer: String,
    pub author: String,
    pub status: ReviewStatus,
    /// ISO-8601 UTC.
    pub reviewed_at: String,
    /// True when the diff was under the lightweight threshold.
    pub lightweight: bool,
    pub diff_lines: u64,
    pub updated_at: String,
}

impl ReviewGate {
    pub fn passes(&self) -> bool {
        self.status == ReviewStatus::Approved
    }
}

/// Input to a quality-gate check: current and previous scores per area.
///
/// Area is an opaque caller-supplied key; the gate never derives areas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub area: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_score: Option<f64>,
    /// ISO-8601 UTC start of a grace period, if one applies to the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_started_at: Option<String>,
}

/// Outcome of a quality-gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum QualityVerdict {
    Pass,
    /// Non-blocking: score is below threshold but inside a grace period,
    /// or dipped without crossing the regression cap.
    Warn { area: String, score: f64, threshold: f64 },
    Reject { area: String, score: f64, threshold: f64 },
}

impl QualityVerdict {
    pub fn blocks(&self) -> bool {
        matches!(self, QualityVerdict::Reject { .. })
    }
}

#[cfg(test)]
#[path = "review_tests.rs"]
mod tests;
