// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry and task-claim registry.
//!
//! One JSON record per session plus a lock file carrying the PID. A task
//! claim lives inside its holder's session record; claim uniqueness is the
//! single-writer-per-session-file rule plus a scan-for-conflict check done
//! under an exclusive claims lock, so racing claimants in separate
//! processes serialize. Claims never survive session end.

use crate::paths::StateTree;
use fs2::FileExt;
use pilot_adapters::ProcessWorld;
use pilot_bus::fsio::{atomic_write_json, read_json};
use pilot_bus::{clear_nudge, Cursor, MessageBus};
use pilot_core::claim::ClaimOutcome;
use pilot_core::clock::{parse_iso_ms, Clock};
use pilot_core::id::{SessionId, TaskId};
use pilot_core::message::BusMessage;
use pilot_core::session::{SessionRecord, SessionStatus};
use std::fs::{File, OpenOptions};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bus error: {0}")]
    Bus(#[from] pilot_bus::BusError),

    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
}

pub struct SessionRegistry<C: Clock, P: ProcessWorld> {
    tree: StateTree,
    bus: Arc<MessageBus<C>>,
    clock: C,
    world: P,
    lease_ms: u64,
}

impl<C: Clock, P: ProcessWorld> SessionRegistry<C, P> {
    pub fn new(tree: StateTree, bus: Arc<MessageBus<C>>, clock: C, world: P, lease_ms: u64) -> Self {
        Self {
            tree,
            bus,
            clock,
            world,
            lease_ms,
        }
    }

    pub fn tree(&self) -> &StateTree {
        &self.tree
    }

    // ── records ──────────────────────────────────────────────────────────

    pub fn load(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, RegistryError> {
        Ok(read_json(&self.tree.session_file(session_id.as_str()))?)
    }

    pub fn save(&self, record: &SessionRecord) -> Result<(), RegistryError> {
        atomic_write_json(&self.tree.session_file(record.session_id.as_str()), record)?;
        Ok(())
    }

    /// Every session record on disk, unparseable files skipped.
    pub fn all_sessions(&self) -> Vec<SessionRecord> {
        let dir = self.tree.sessions_dir();
        let mut sessions = Vec::new();
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return sessions;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Ok(Some(record)) = read_json::<SessionRecord>(&path) {
                sessions.push(record);
            }
        }
        sessions
    }

    pub fn active_sessions(&self) -> Vec<SessionRecord> {
        self.all_sessions()
            .into_iter()
            .filter(|s| s.is_active())
            .collect()
    }

    // ── identity ─────────────────────────────────────────────────────────

    /// Identify "the current session" for this process.
    ///
    /// Order: `PILOT_SESSION_ID` pin → active record owned by this process
    /// or an ancestor → resurrection of an ended record whose `parent_pid`
    /// is this process or a live ancestor → fresh session. Resurrection
    /// prefers the most recent heartbeat and never steals a claim held by
    /// another live session (ended records hold no claims).
    pub fn resolve_current_session(
        &self,
        agent_name: &str,
        role: &str,
    ) -> Result<SessionRecord, RegistryError> {
        let pid = self.world.current_pid();
        let parent = self.world.current_parent_pid();

        if let Ok(pinned) = std::env::var("PILOT_SESSION_ID") {
            let session_id = SessionId::new(pinned);
            if let Some(mut record) = self.load(&session_id)? {
                if record.status == SessionStatus::Ended {
                    record.resurrect(&self.clock, pid);
                }
                self.save(&record)?;
                self.write_lock(&record)?;
                return Ok(record);
            }
            return self.create_session(session_id, pid, parent, agent_name, role);
        }

        let mut owned: Vec<u32> = vec![pid];
        owned.extend(self.world.ancestors_of(pid));

        let sessions = self.all_sessions();
        if let Some(record) = sessions
            .iter()
            .find(|s| s.is_active() && owned.contains(&s.pid))
        {
            return Ok(record.clone());
        }

        // Resurrect: a terminal re-entered after a dropout resumes its task
        let mut candidates: Vec<&SessionRecord> = sessions
            .iter()
            .filter(|s| {
                s.status == SessionStatus::Ended
                    && owned.contains(&s.parent_pid)
                    && self.world.is_alive(s.parent_pid)
            })
            .collect();
        candidates.sort_by_key(|s| parse_iso_ms(&s.last_heartbeat).unwrap_or(0));
        if let Some(ended) = candidates.pop() {
            let mut record = ended.clone();
            record.resurrect(&self.clock, pid);
            self.save(&record)?;
            self.write_lock(&record)?;
            tracing::info!(session_id = %record.session_id, "session resurrected");
            return Ok(record);
        }

        self.create_session(SessionId::generate(), pid, parent, agent_name, role)
    }

    fn create_session(
        &self,
        session_id: SessionId,
        pid: u32,
        parent_pid: u32,
        agent_name: &str,
        role: &str,
    ) -> Result<SessionRecord, RegistryError> {
        let record = SessionRecord::new(&self.clock, session_id, pid, parent_pid, agent_name, role);
        self.save(&record)?;
        self.write_lock(&record)?;
        tracing::info!(session_id = %record.session_id, pid, "session created");
        Ok(record)
    }

    fn write_lock(&self, record: &SessionRecord) -> Result<(), RegistryError> {
        let path = self.tree.lock_file(record.session_id.as_str());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, record.pid.to_string())?;
        Ok(())
    }

    // ── liveness ─────────────────────────────────────────────────────────

    /// Alive iff the lock file exists and the PID inside it is live.
    pub fn is_session_alive(&self, session_id: &SessionId) -> bool {
        let path = self.tree.lock_file(session_id.as_str());
        let Ok(text) = std::fs::read_to_string(&path) else {
            return false;
        };
        let Ok(pid) = text.trim().parse::<u32>() else {
            return false;
        };
        self.world.is_alive(pid)
    }

    pub fn heartbeat(&self, session_id: &SessionId) -> Result<(), RegistryError> {
        let Some(mut record) = self.load(session_id)? else {
            return Err(RegistryError::UnknownSession(session_id.clone()));
        };
        record.heartbeat(&self.clock);
        self.save(&record)
    }

    // ── claims ───────────────────────────────────────────────────────────

    /// Take the exclusive claims lock. Held for the scan + write of one
    /// claim attempt; released when the handle drops. Without it, two
    /// claimants in separate processes could both pass the conflict scan
    /// before either commits.
    fn claims_lock(&self) -> Result<File, RegistryError> {
        let path = self.tree.claims_lock_file();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    /// Atomic claim attempt. Idempotent for the current holder; an expired
    /// lease does not block a new claimer.
    pub fn claim_task(
        &self,
        session_id: &SessionId,
        task_id: &TaskId,
    ) -> Result<ClaimOutcome, RegistryError> {
        // NOTE(lifetime): held to serialize the scan against concurrent
        // claim writes from other processes
        let _lock = self.claims_lock()?;

        let now_ms = self.clock.epoch_ms();
        for other in self.active_sessions() {
            if &other.session_id == session_id {
                continue;
            }
            if let Some(claim) = other.live_claim(now_ms) {
                if &claim.task_id == task_id && self.is_session_alive(&other.session_id) {
                    return Ok(ClaimOutcome::AlreadyClaimed {
                        by: other.session_id,
                    });
                }
            }
        }

        let Some(mut record) = self.load(session_id)? else {
            return Err(RegistryError::UnknownSession(session_id.clone()));
        };
        record.set_claim(&self.clock, task_id.clone(), self.lease_ms);
        self.save(&record)?;
        let claim = record
            .live_claim(now_ms)
            .unwrap_or(pilot_core::claim::TaskClaim {
                task_id: task_id.clone(),
                session_id: session_id.clone(),
                claimed_at: record.updated_at.clone(),
                lease_expires_at: record.updated_at.clone(),
            });
        Ok(ClaimOutcome::Claimed { claim })
    }

    /// Clear the claim and broadcast `task.released`.
    pub fn release_task(&self, session_id: &SessionId) -> Result<Option<TaskId>, RegistryError> {
        let Some(mut record) = self.load(session_id)? else {
            return Err(RegistryError::UnknownSession(session_id.clone()));
        };
        let released = record.clear_claim(&self.clock);
        self.save(&record)?;
        if let Some(task_id) = &released {
            self.broadcast_released(session_id, task_id)?;
        }
        Ok(released)
    }

    fn broadcast_released(
        &self,
        session_id: &SessionId,
        task_id: &TaskId,
    ) -> Result<(), RegistryError> {
        let msg = BusMessage::broadcast(session_id.as_str(), "task.released")
            .with_payload(serde_json::json!({ "task_id": task_id }));
        self.bus.send(msg)?;
        Ok(())
    }

    /// Whether any live active session holds this task (expired leases
    /// ignored).
    pub fn is_task_claimed(&self, task_id: &TaskId) -> bool {
        self.claim_holder(task_id).is_some()
    }

    pub fn claim_holder(&self, task_id: &TaskId) -> Option<SessionId> {
        let now_ms = self.clock.epoch_ms();
        self.active_sessions().into_iter().find_map(|s| {
            s.live_claim(now_ms)
                .filter(|c| &c.task_id == task_id)
                .map(|_| s.session_id)
        })
    }

    // ── teardown ─────────────────────────────────────────────────────────

    /// Mark a session ended: release its claim, remove the lock file,
    /// delete its bus cursor and nudge marker.
    pub fn end_session(
        &self,
        session_id: &SessionId,
        reason: &str,
    ) -> Result<Option<TaskId>, RegistryError> {
        let Some(mut record) = self.load(session_id)? else {
            return Err(RegistryError::UnknownSession(session_id.clone()));
        };
        let released = record.claimed_task.clone();
        record.mark_ended(&self.clock, reason);
        self.save(&record)?;

        let _ = std::fs::remove_file(self.tree.lock_file(session_id.as_str()));
        Cursor::delete(self.bus.paths(), session_id.as_str())?;
        clear_nudge(self.bus.paths(), session_id.as_str());

        if let Some(task_id) = &released {
            self.broadcast_released(session_id, task_id)?;
        }
        tracing::info!(session_id = %session_id, reason, "session ended");
        Ok(released)
    }

    /// End every active session whose PID is dead or whose heartbeat is
    /// older than `stale_ms`. Returns the swept session ids.
    pub fn sweep_stale(&self, stale_ms: u64) -> Vec<SessionId> {
        let now_ms = self.clock.epoch_ms();
        let mut swept = Vec::new();
        for record in self.active_sessions() {
            let pid_dead = !self.world.is_alive(record.pid);
            let heartbeat_stale = record.heartbeat_age_ms(now_ms) > stale_ms;
            if !pid_dead && !heartbeat_stale {
                continue;
            }
            let reason = if pid_dead { "pid_dead" } else { "heartbeat_stale" };
            if let Err(e) = self.end_session(&record.session_id, reason) {
                tracing::warn!(session_id = %record.session_id, error = %e, "stale sweep failed");
                continue;
            }
            swept.push(record.session_id);
        }
        swept
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
