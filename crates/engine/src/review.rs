// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer-review gates and the quality gate.
//!
//! The PM consults `review-gates/<task>.json` before advancing a merge
//! task: missing or rejected blocks, approved passes. Auto-review picks a
//! reviewer by expertise and records the gate idempotently.

use crate::board::AgentRegistry;
use crate::paths::StateTree;
use crate::EngineError;
use pilot_bus::fsio::{atomic_write_json, read_json};
use pilot_core::clock::{parse_iso_ms, Clock};
use pilot_core::id::TaskId;
use pilot_core::review::{QualityCheck, QualityVerdict, ReviewGate, ReviewStatus};
use pilot_policy::ApprovalPolicy;

pub struct ReviewStore<C: Clock> {
    tree: StateTree,
    clock: C,
    policy: ApprovalPolicy,
}

impl<C: Clock> ReviewStore<C> {
    pub fn new(tree: StateTree, clock: C, policy: ApprovalPolicy) -> Self {
        Self {
            tree,
            clock,
            policy,
        }
    }

    pub fn load(&self, task_id: &TaskId) -> Option<ReviewGate> {
        read_json(&self.tree.review_gate_file(task_id.as_str()))
            .ok()
            .flatten()
    }

    /// Whether the task may advance to merge. Missing gate blocks when
    /// policy requires reviews.
    pub fn merge_allowed(&self, task_id: &TaskId) -> bool {
        if !self.policy.require_peer_review {
            return true;
        }
        self.load(task_id).map(|g| g.passes()).unwrap_or(false)
    }

    /// Record an auto-review. The reviewer is chosen by expertise from the
    /// registry (first role carrying the capability, skipping the author);
    /// diffs at or under the lightweight threshold get the light pass.
    /// Registering the same result twice yields one gate file with
    /// identical content.
    pub fn auto_review(
        &self,
        task_id: &TaskId,
        author: &str,
        capability: &str,
        diff_lines: u64,
        status: ReviewStatus,
        registry: &AgentRegistry,
    ) -> Result<ReviewGate, EngineError> {
        let reviewer = registry
            .query_by_capability(capability)
            .into_iter()
            .map(|e| e.role.clone())
            .find(|role| role != author)
            .unwrap_or_else(|| "pm".to_string());

        // Idempotent: an existing gate with the same verdict is kept as-is
        if let Some(existing) = self.load(task_id) {
            if existing.status == status && existing.reviewer == reviewer {
                return Ok(existing);
            }
        }

        let gate = ReviewGate {
            task_id: task_id.clone(),
            reviewer,
            author: author.to_string(),
            status,
            reviewed_at: self.clock.now_iso(),
            lightweight: diff_lines <= self.policy.lightweight_diff_lines,
            diff_lines,
            updated_at: self.clock.now_iso(),
        };
        atomic_write_json(&self.tree.review_gate_file(task_id.as_str()), &gate)?;
        Ok(gate)
    }

    /// Clear a gate when its task reopens.
    pub fn clear(&self, task_id: &TaskId) -> Result<(), EngineError> {
        match std::fs::remove_file(self.tree.review_gate_file(task_id.as_str())) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Evaluate quality checks for a commit/merge.
///
/// Per-area thresholds (default from policy) are relaxed inside a grace
/// period; a drop beyond the per-commit regression cap rejects even above
/// threshold; below-threshold without grace rejects; dips within the cap
/// warn without blocking.
pub fn quality_gate<C: Clock>(
    checks: &[QualityCheck],
    policy: &ApprovalPolicy,
    clock: &C,
) -> Vec<QualityVerdict> {
    let now_ms = clock.epoch_ms();
    checks
        .iter()
        .map(|check| {
            let mut threshold = policy
                .area_thresholds
                .get(&check.area)
                .copied()
                .unwrap_or(policy.quality_threshold);

            let in_grace = check
                .grace_started_at
                .as_deref()
                .and_then(parse_iso_ms)
                .map(|start| {
                    now_ms.saturating_sub(start) <= policy.grace_days as u64 * 86_400_000
                })
                .unwrap_or(false);
            if in_grace {
                threshold *= 1.0 - policy.grace_relaxation;
            }

            let regression = check
                .previous_score
                .map(|prev| prev - check.score)
                .unwrap_or(0.0);

            if regression > policy.regression_cap || check.score < threshold {
                QualityVerdict::Reject {
                    area: check.area.clone(),
                    score: check.score,
                    threshold,
                }
            } else if regression > 0.0 {
                QualityVerdict::Warn {
                    area: check.area.clone(),
                    score: check.score,
                    threshold,
                }
            } else {
                QualityVerdict::Pass
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "review_tests.rs"]
mod tests;
