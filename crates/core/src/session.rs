// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session records for agent processes.
//!
//! One JSON file per session under `state/sessions/<sid>.json`, plus a lock
//! file under `state/locks/<sid>.lock` whose presence (and PID liveness)
//! means the session is alive.

use crate::claim::TaskClaim;
use crate::clock::{parse_iso_ms, Clock};
use crate::id::{SessionId, TaskId};
use serde::{Deserialize, Serialize};

/// Default task-claim lease (30 minutes).
pub const DEFAULT_LEASE_MS: u64 = 30 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// One agent session's persistent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub pid: u32,
    pub parent_pid: u32,
    pub agent_name: String,
    pub role: String,
    pub status: SessionStatus,
    /// ISO-8601 UTC.
    pub started_at: String,
    /// ISO-8601 UTC; refreshed on every prompt/heartbeat.
    pub last_heartbeat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_task: Option<TaskId>,
    /// ISO-8601 UTC; set alongside `claimed_task`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locked_areas: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locked_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
    /// ISO-8601 UTC; bumped on every mutation.
    pub updated_at: String,
}

impl SessionRecord {
    /// Create a fresh active record for a newly started session.
    pub fn new<C: Clock>(
        clock: &C,
        session_id: SessionId,
        pid: u32,
        parent_pid: u32,
        agent_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        let now = clock.now_iso();
        Self {
            session_id,
            pid,
            parent_pid,
            agent_name: agent_name.into(),
            role: role.into(),
            status: SessionStatus::Active,
            started_at: now.clone(),
            last_heartbeat: now.clone(),
            claimed_task: None,
            lease_expires_at: None,
            locked_areas: Vec::new(),
            locked_files: Vec::new(),
            ended_at: None,
            end_reason: None,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Refresh the heartbeat timestamp.
    pub fn heartbeat<C: Clock>(&mut self, clock: &C) {
        self.last_heartbeat = clock.now_iso();
        self.updated_at = clock.now_iso();
    }

    /// Milliseconds since the last heartbeat (saturating).
    pub fn heartbeat_age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(parse_iso_ms(&self.last_heartbeat).unwrap_or(0))
    }

    /// The claim currently held, if its lease has not expired.
    pub fn live_claim(&self, now_ms: u64) -> Option<TaskClaim> {
        let task_id = self.claimed_task.clone()?;
        let lease_expires_at = self.lease_expires_at.clone()?;
        if parse_iso_ms(&lease_expires_at).unwrap_or(0) <= now_ms {
            return None;
        }
        Some(TaskClaim {
            task_id,
            session_id: self.session_id.clone(),
            claimed_at: self.updated_at.clone(),
            lease_expires_at,
        })
    }

    /// Record a claim with a fresh lease.
    pub fn set_claim<C: Clock>(&mut self, clock: &C, task_id: TaskId, lease_ms: u64) {
        let expires = clock.epoch_ms() + lease_ms;
        self.claimed_task = Some(task_id);
        self.lease_expires_at = Some(iso_from_ms(expires));
        self.updated_at = clock.now_iso();
    }

    /// Drop the claim (release, lease expiry, or session end).
    pub fn clear_claim<C: Clock>(&mut self, clock: &C) -> Option<TaskId> {
        let released = self.claimed_task.take();
        self.lease_expires_at = None;
        self.updated_at = clock.now_iso();
        released
    }

    /// Mark ended. Claims never survive session end.
    pub fn mark_ended<C: Clock>(&mut self, clock: &C, reason: impl Into<String>) {
        self.status = SessionStatus::Ended;
        self.ended_at = Some(clock.now_iso());
        self.end_reason = Some(reason.into());
        self.claimed_task = None;
        self.lease_expires_at = None;
        self.updated_at = clock.now_iso();
    }

    /// Resurrect an ended record: a terminal re-entered after a brief
    /// dropout resumes rather than abandoning its task. The claim is
    /// preserved (it was already released if the record was swept).
    pub fn resurrect<C: Clock>(&mut self, clock: &C, pid: u32) {
        self.status = SessionStatus::Active;
        self.pid = pid;
        self.ended_at = None;
        self.end_reason = None;
        self.last_heartbeat = clock.now_iso();
        self.updated_at = clock.now_iso();
    }
}

/// Render epoch milliseconds as ISO-8601 UTC.
pub fn iso_from_ms(ms: u64) -> String {
    chrono::TimeZone::timestamp_millis_opt(&chrono::Utc, ms as i64)
        .single()
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
