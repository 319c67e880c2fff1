// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task claims: leased, single-holder ownership of a tracker task.

use crate::id::{SessionId, TaskId};
use serde::{Deserialize, Serialize};

/// A session's leased claim on one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskClaim {
    pub task_id: TaskId,
    pub session_id: SessionId,
    /// ISO-8601 UTC.
    pub claimed_at: String,
    /// ISO-8601 UTC.
    pub lease_expires_at: String,
}

/// Result of a claim attempt. A structured record, never an error: callers
/// routinely race for tasks and pick another on conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Claimed { claim: TaskClaim },
    AlreadyClaimed { by: SessionId },
}

impl ClaimOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed { .. })
    }
}

#[cfg(test)]
#[path = "claim_tests.rs"]
mod tests;
