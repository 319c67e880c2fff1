// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progressive escalation engine.
//!
//! One state machine per `(event_type, session, task?)`, advanced only
//! after its cooldown, pinned at the last configured level, resolved
//! explicitly or by auto-de-escalation. Every transition is appended to an
//! audit log. Single-writer: only the PM daemon calls into this.

use crate::paths::StateTree;
use crate::EngineError;
use pilot_bus::fsio::{append_jsonl, atomic_write_json, read_json};
use pilot_bus::MessageBus;
use pilot_core::clock::{parse_iso_ms, Clock};
use pilot_core::escalation::{
    event_key, BlockMarker, EscalationEvent, EscalationLevel, EscalationState, EventKey,
};
use pilot_core::id::{SessionId, TaskId};
use pilot_core::message::{BusMessage, MessageType, Priority};
use pilot_policy::EnforcementPolicy;
use serde::Serialize;
use std::sync::Arc;

/// What a trigger did.
#[derive(Debug, Clone, PartialEq)]
pub enum EscalationAction {
    /// Level advanced (or first trigger): agent notified.
    Warned,
    /// Level advanced to block: marker written, edits refused.
    Blocked,
    /// Level advanced to reassign: caller must release the claim and route
    /// the task through the recovery pathway.
    ReassignRequested { task_id: Option<TaskId> },
    /// Level advanced to human: human-escalation queue appended.
    HumanQueued,
    /// Already at the terminal level; logged `repeated_at_max`.
    RepeatedAtMax,
    /// Re-trigger inside the cooldown window; state unchanged.
    CoolingDown,
}

#[derive(Serialize)]
struct AuditEntry<'a> {
    ts: &'a str,
    event_key: &'a str,
    action: &'a str,
    level: &'a str,
    detail: &'a str,
}

/// Entry appended to the human-escalation queue.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct HumanEscalation {
    pub event_key: EventKey,
    pub event_type: EscalationEvent,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub detail: String,
    pub queued_at: String,
    #[serde(default)]
    pub resolved: bool,
}

pub struct Escalator<C: Clock> {
    tree: StateTree,
    bus: Arc<MessageBus<C>>,
    clock: C,
    policy: EnforcementPolicy,
}

impl<C: Clock> Escalator<C> {
    pub fn new(
        tree: StateTree,
        bus: Arc<MessageBus<C>>,
        clock: C,
        policy: EnforcementPolicy,
    ) -> Self {
        Self {
            tree,
            bus,
            clock,
            policy,
        }
    }

    pub fn tree(&self) -> &StateTree {
        &self.tree
    }

    /// Trigger an event. Advances at most one level per cooldown window.
    pub fn trigger(
        &self,
        event: EscalationEvent,
        session_id: &SessionId,
        task_id: Option<&TaskId>,
        detail: &str,
    ) -> Result<(EscalationState, EscalationAction), EngineError> {
        let key = event_key(event, session_id, task_id);
        let path_config = self.policy.escalation_for(event);
        let now_ms = self.clock.epoch_ms();

        let existing: Option<EscalationState> =
            read_json(&self.tree.escalation_file(&key)).unwrap_or_default();

        let mut state = match existing {
            // After resolve, a further trigger restarts at index 0
            Some(state) if !state.resolved => state,
            _ => {
                let state = EscalationState {
                    event_type: event,
                    session_id: session_id.clone(),
                    task_id: task_id.cloned(),
                    level: path_config.path[0],
                    level_index: 0,
                    first_triggered: self.clock.now_iso(),
                    last_escalated: self.clock.now_iso(),
                    retries: 0,
                    resolved: false,
                    resolved_by: None,
                    updated_at: self.clock.now_iso(),
                };
                let action = self.perform_level_action(&state, detail)?;
                self.persist(&key, &state)?;
                self.audit(&key, "triggered", state.level, detail)?;
                return Ok((state, action));
            }
        };

        let cooldown_ms = path_config.cooldown_secs * 1000;
        let since_last = now_ms.saturating_sub(parse_iso_ms(&state.last_escalated).unwrap_or(0));
        if since_last < cooldown_ms {
            return Ok((state, EscalationAction::CoolingDown));
        }

        if state.level_index + 1 >= path_config.path.len() {
            state.retries += 1;
            state.updated_at = self.clock.now_iso();
            self.persist(&key, &state)?;
            self.audit(&key, "repeated_at_max", state.level, detail)?;
            return Ok((state, EscalationAction::RepeatedAtMax));
        }

        state.level_index += 1;
        state.level = path_config.path[state.level_index];
        state.last_escalated = self.clock.now_iso();
        state.updated_at = self.clock.now_iso();
        let action = self.perform_level_action(&state, detail)?;
        self.persist(&key, &state)?;
        self.audit(&key, "escalated", state.level, detail)?;
        Ok((state, action))
    }

    /// Explicit resolution. Pending lower-level actions become no-ops; the
    /// block marker is cleared.
    pub fn resolve(&self, key: &EventKey, by: &str) -> Result<(), EngineError> {
        let Some(mut state) = read_json::<EscalationState>(&self.tree.escalation_file(key))?
        else {
            return Ok(());
        };
        state.resolved = true;
        state.resolved_by = Some(by.to_string());
        state.updated_at = self.clock.now_iso();
        self.persist(key, &state)?;
        self.unblock(&state.session_id)?;
        self.audit(key, "resolved", state.level, by)?;
        Ok(())
    }

    /// Re-check every unresolved state whose policy allows
    /// auto-de-escalation; `cleared` reports whether the triggering
    /// condition has gone away. Returns the resolved keys.
    pub fn auto_deescalate(
        &self,
        cleared: impl Fn(&EscalationState) -> bool,
    ) -> Result<Vec<EventKey>, EngineError> {
        let mut resolved = Vec::new();
        for (key, state) in self.all_states() {
            if state.resolved {
                continue;
            }
            if !self.policy.escalation_for(state.event_type).auto_deescalate {
                continue;
            }
            if cleared(&state) {
                self.resolve(&key, "auto_deescalation")?;
                resolved.push(key);
            }
        }
        Ok(resolved)
    }

    /// Every escalation state on disk, keyed.
    pub fn all_states(&self) -> Vec<(EventKey, EscalationState)> {
        let mut states = Vec::new();
        let Ok(entries) = std::fs::read_dir(self.tree.escalations_dir()) else {
            return states;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(Some(state)) = read_json::<EscalationState>(&path) {
                states.push((stem.to_string(), state));
            }
        }
        states
    }

    pub fn load_state(&self, key: &EventKey) -> Option<EscalationState> {
        read_json(&self.tree.escalation_file(key)).ok().flatten()
    }

    // ── block markers ────────────────────────────────────────────────────

    /// Pre-tool-use hooks consult this before allowing edits.
    pub fn is_agent_blocked(&self, session_id: &SessionId) -> bool {
        self.tree.block_marker_file(session_id.as_str()).exists()
    }

    pub fn block_marker(&self, session_id: &SessionId) -> Option<BlockMarker> {
        read_json(&self.tree.block_marker_file(session_id.as_str()))
            .ok()
            .flatten()
    }

    /// Write a block marker outside the normal level flow (lockdown).
    pub fn force_block(
        &self,
        session_id: &SessionId,
        reason: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        self.block(session_id, None, reason, message)
    }

    /// Append a queue entry for an unresolved human-level state that is
    /// not yet queued. Returns whether an entry was appended.
    pub fn ensure_human_queued(&self, state: &EscalationState) -> Result<bool, EngineError> {
        let key = event_key(state.event_type, &state.session_id, state.task_id.as_ref());
        let queued = self.human_queue().iter().any(|e| e.event_key == key);
        if queued {
            return Ok(false);
        }
        let entry = HumanEscalation {
            event_key: key,
            event_type: state.event_type,
            session_id: state.session_id.clone(),
            task_id: state.task_id.clone(),
            detail: "unresolved at human level".to_string(),
            queued_at: self.clock.now_iso(),
            resolved: false,
        };
        append_jsonl(&self.tree.human_escalations_file(), &entry)?;
        Ok(true)
    }

    fn block(
        &self,
        session_id: &SessionId,
        task_id: Option<&TaskId>,
        reason: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        let marker = BlockMarker {
            blocked_at: self.clock.now_iso(),
            reason: reason.to_string(),
            task_id: task_id.cloned(),
            message: message.to_string(),
        };
        atomic_write_json(&self.tree.block_marker_file(session_id.as_str()), &marker)?;
        Ok(())
    }

    fn unblock(&self, session_id: &SessionId) -> Result<(), EngineError> {
        let path = self.tree.block_marker_file(session_id.as_str());
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Outstanding human-escalation queue entries.
    pub fn human_queue(&self) -> Vec<HumanEscalation> {
        pilot_bus::fsio::read_jsonl(&self.tree.human_escalations_file()).unwrap_or_default()
    }

    // ── internals ────────────────────────────────────────────────────────

    fn perform_level_action(
        &self,
        state: &EscalationState,
        detail: &str,
    ) -> Result<EscalationAction, EngineError> {
        let event = state.event_type;
        let session_id = &state.session_id;
        match state.level {
            EscalationLevel::Warning => {
                self.notify_agent(state, &format!("escalation.{}.warning", event.name()), detail)?;
                Ok(EscalationAction::Warned)
            }
            EscalationLevel::Block => {
                self.block(session_id, state.task_id.as_ref(), event.name(), detail)?;
                self.notify_agent(state, &format!("escalation.{}.block", event.name()), detail)?;
                tracing::warn!(session_id = %session_id, event = event.name(), "agent blocked");
                Ok(EscalationAction::Blocked)
            }
            EscalationLevel::Reassign => {
                self.unblock(session_id)?;
                let msg = BusMessage::broadcast(PM_SENDER, "escalation.task_reassigned")
                    .with_payload(serde_json::json!({
                        "session_id": session_id,
                        "task_id": state.task_id,
                        "event": event.name(),
                    }));
                self.bus.send(msg)?;
                Ok(EscalationAction::ReassignRequested {
                    task_id: state.task_id.clone(),
                })
            }
            EscalationLevel::Human => {
                let entry = HumanEscalation {
                    event_key: event_key(event, session_id, state.task_id.as_ref()),
                    event_type: event,
                    session_id: session_id.clone(),
                    task_id: state.task_id.clone(),
                    detail: detail.to_string(),
                    queued_at: self.clock.now_iso(),
                    resolved: false,
                };
                append_jsonl(&self.tree.human_escalations_file(), &entry)?;
                tracing::warn!(session_id = %session_id, event = event.name(), "human escalation queued");
                Ok(EscalationAction::HumanQueued)
            }
        }
    }

    fn notify_agent(
        &self,
        state: &EscalationState,
        topic: &str,
        detail: &str,
    ) -> Result<(), EngineError> {
        let msg = BusMessage::new(MessageType::Escalation, PM_SENDER)
            .to(state.session_id.as_str())
            .with_topic(topic)
            .with_priority(Priority::Blocking)
            .with_payload(serde_json::json!({
                "event": state.event_type.name(),
                "level": state.level.name(),
                "task_id": state.task_id,
                "detail": detail,
            }));
        self.bus.send(msg)?;
        Ok(())
    }

    fn persist(&self, key: &EventKey, state: &EscalationState) -> Result<(), EngineError> {
        atomic_write_json(&self.tree.escalation_file(key), state)?;
        Ok(())
    }

    fn audit(
        &self,
        key: &EventKey,
        action: &str,
        level: EscalationLevel,
        detail: &str,
    ) -> Result<(), EngineError> {
        let ts = self.clock.now_iso();
        append_jsonl(
            &self.tree.escalation_log_file(),
            &AuditEntry {
                ts: &ts,
                event_key: key,
                action,
                level: level.name(),
                detail,
            },
        )?;
        Ok(())
    }
}

/// Sender id the PM uses on the bus.
pub const PM_SENDER: &str = "pm";

#[cfg(test)]
#[path = "escalation_tests.rs"]
mod tests;
