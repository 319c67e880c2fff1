// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cost records: per-task and per-agent-per-day token accounting.
//!
//! Counters only ever increase. Tokens are estimated from tool output
//! bytes at 4 bytes per token; binary output is counted the same as text.

use crate::id::{SessionId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default price per million tokens (USD), overridable in policy.
pub const COST_PER_MILLION_TOKENS: f64 = 10.0;

/// Estimate tokens for a tool-output byte count.
pub fn tokens_for_bytes(bytes: u64) -> u64 {
    (bytes as f64 / 4.0).round() as u64
}

/// Dollar cost of a token count at the given per-million rate.
pub fn cost_usd(tokens: u64, per_million: f64) -> f64 {
    tokens as f64 / 1_000_000.0 * per_million
}

/// Per-session slice of a task's spend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCost {
    pub bytes: u64,
    pub tokens: u64,
    pub calls: u64,
}

/// Cumulative cost of one task across all sessions that touched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCost {
    pub task_id: TaskId,
    pub total_bytes: u64,
    pub total_tokens: u64,
    pub total_calls: u64,
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionCost>,
    pub updated_at: String,
}

impl TaskCost {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            total_bytes: 0,
            total_tokens: 0,
            total_calls: 0,
            sessions: BTreeMap::new(),
            updated_at: String::new(),
        }
    }

    /// Add one tool call's output to the counters.
    pub fn record(&mut self, session_id: &SessionId, bytes: u64) {
        let tokens = tokens_for_bytes(bytes);
        self.total_bytes += bytes;
        self.total_tokens += tokens;
        self.total_calls += 1;
        let slot = self.sessions.entry(session_id.to_string()).or_default();
        slot.bytes += bytes;
        slot.tokens += tokens;
        slot.calls += 1;
    }
}

/// One day's spend for an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayCost {
    pub bytes: u64,
    pub tokens: u64,
    pub calls: u64,
}

/// Cumulative cost of one agent session, bucketed by day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCost {
    pub session_id: SessionId,
    /// `YYYY-MM-DD` → that day's counters.
    #[serde(default)]
    pub days: BTreeMap<String, DayCost>,
    pub total_tokens: u64,
    #[serde(default)]
    pub tasks_worked: Vec<TaskId>,
    pub updated_at: String,
}

impl AgentCost {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            days: BTreeMap::new(),
            total_tokens: 0,
            tasks_worked: Vec::new(),
            updated_at: String::new(),
        }
    }

    pub fn record(&mut self, day: &str, task_id: &TaskId, bytes: u64) {
        let tokens = tokens_for_bytes(bytes);
        self.total_tokens += tokens;
        let slot = self.days.entry(day.to_string()).or_default();
        slot.bytes += bytes;
        slot.tokens += tokens;
        slot.calls += 1;
        if !self.tasks_worked.contains(task_id) {
            self.tasks_worked.push(task_id.clone());
        }
    }

    pub fn tokens_on(&self, day: &str) -> u64 {
        self.days.get(day).map(|d| d.tokens).unwrap_or(0)
    }
}

/// Result of a budget check. Variant order is severity order; a combined
/// check reports the most restrictive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BudgetStatus {
    Ok,
    Warning { scope: String, tokens: u64, limit: u64 },
    Exceeded { scope: String, tokens: u64, limit: u64 },
}

impl BudgetStatus {
    pub fn severity(&self) -> u8 {
        match self {
            BudgetStatus::Ok => 0,
            BudgetStatus::Warning { .. } => 1,
            BudgetStatus::Exceeded { .. } => 2,
        }
    }

    /// Keep the more restrictive of two results.
    pub fn combine(self, other: BudgetStatus) -> BudgetStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

#[cfg(test)]
#[path = "cost_tests.rs"]
mod tests;
