// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Escalation state: per-event progressive state machines.
//!
//! One state file per `(event_type, session_id, task_id?)` key under
//! `state/escalations/`. Only the PM daemon mutates these.

use crate::id::{SessionId, TaskId};
use serde::{Deserialize, Serialize};

/// Events that can escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationEvent {
    Drift,
    TestFailure,
    BudgetExceeded,
    MergeConflict,
    AgentUnresponsive,
}

impl EscalationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EscalationEvent::Drift => "drift",
            EscalationEvent::TestFailure => "test_failure",
            EscalationEvent::BudgetExceeded => "budget_exceeded",
            EscalationEvent::MergeConflict => "merge_conflict",
            EscalationEvent::AgentUnresponsive => "agent_unresponsive",
        }
    }

    pub fn all() -> [EscalationEvent; 5] {
        [
            EscalationEvent::Drift,
            EscalationEvent::TestFailure,
            EscalationEvent::BudgetExceeded,
            EscalationEvent::MergeConflict,
            EscalationEvent::AgentUnresponsive,
        ]
    }
}

/// Escalation levels, in severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    Warning,
    Block,
    Reassign,
    Human,
}

impl EscalationLevel {
    pub fn name(&self) -> &'static str {
        match self {
            EscalationLevel::Warning => "warning",
            EscalationLevel::Block => "block",
            EscalationLevel::Reassign => "reassign",
            EscalationLevel::Human => "human",
        }
    }
}

/// Default path, cooldown, and auto-de-escalation per event type.
pub struct PathDefaults {
    pub event: EscalationEvent,
    pub path: &'static [EscalationLevel],
    pub cooldown_secs: u64,
    pub auto_deescalate: bool,
}

/// Spec-default escalation paths, overridable in policy.
pub const DEFAULT_PATHS: [PathDefaults; 5] = [
    PathDefaults {
        event: EscalationEvent::Drift,
        path: &[
            EscalationLevel::Warning,
            EscalationLevel::Block,
            EscalationLevel::Reassign,
            EscalationLevel::Human,
        ],
        cooldown_secs: 120,
        auto_deescalate: true,
    },
    PathDefaults {
        event: EscalationEvent::TestFailure,
        path: &[
            EscalationLevel::Warning,
            EscalationLevel::Reassign,
            EscalationLevel::Human,
        ],
        cooldown_secs: 60,
        auto_deescalate: true,
    },
    PathDefaults {
        event: EscalationEvent::BudgetExceeded,
        path: &[
            EscalationLevel::Warning,
            EscalationLevel::Block,
            EscalationLevel::Human,
        ],
        cooldown_secs: 300,
        auto_deescalate: false,
    },
    PathDefaults {
        event: EscalationEvent::MergeConflict,
        path: &[
            EscalationLevel::Warning,
            EscalationLevel::Block,
            EscalationLevel::Reassign,
            EscalationLevel::Human,
        ],
        cooldown_secs: 60,
        auto_deescalate: true,
    },
    PathDefaults {
        event: EscalationEvent::AgentUnresponsive,
        path: &[
            EscalationLevel::Warning,
            EscalationLevel::Reassign,
            EscalationLevel::Human,
        ],
        cooldown_secs: 30,
        auto_deescalate: false,
    },
];

/// Filesystem-safe key for one escalation state:
/// `<event>_<session>[_<task>]`.
pub type EventKey = String;

pub fn event_key(
    event: EscalationEvent,
    session_id: &SessionId,
    task_id: Option<&TaskId>,
) -> EventKey {
    match task_id {
        Some(task) => format!("{}_{}_{}", event.name(), session_id, task),
        None => format!("{}_{}", event.name(), session_id),
    }
}

/// Persistent state of one escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationState {
    pub event_type: EscalationEvent,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub level: EscalationLevel,
    /// Index into the configured path for this event type.
    pub level_index: usize,
    /// ISO-8601 UTC.
    pub first_triggered: String,
    /// ISO-8601 UTC.
    pub last_escalated: String,
    pub retries: u32,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    pub updated_at: String,
}

/// Block marker written when an escalation reaches `block`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMarker {
    /// ISO-8601 UTC.
    pub blocked_at: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub message: String,
}

#[cfg(test)]
#[path = "escalation_tests.rs"]
mod tests;
