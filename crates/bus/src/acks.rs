// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-ACK ledger and dead-letter queue.
//!
//! Messages sent with `ack.required` get a ledger entry. A periodic sweep
//! (driven from the daemon tick) retries expired entries up to
//! [`ACK_MAX_RETRIES`], walks the escalation chain when one is present, and
//! finally promotes the entry to `dlq.jsonl`.

use crate::fsio::{append_jsonl, read_jsonl, rewrite_jsonl};
use crate::{BusError, BusPaths};
use pilot_core::clock::{parse_iso_ms, Clock};
use pilot_core::message::BusMessage;
use pilot_core::session::iso_from_ms;
use serde::{Deserialize, Serialize};

/// Retries before an unacknowledged message is dead-lettered or escalated.
pub const ACK_MAX_RETRIES: u32 = 3;

/// One outstanding acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAck {
    pub message_id: String,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_role: Option<String>,
    /// ISO-8601 UTC.
    pub deadline_at: String,
    /// The original deadline window, reused for each extension.
    pub deadline_ms: u64,
    pub retries: u32,
    #[serde(default)]
    pub escalate_to_pm: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_chain: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_level: Option<usize>,
}

/// Terminal record in `dlq.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message_id: String,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub reason: String,
    pub retries: u32,
    /// ISO-8601 UTC.
    pub dead_at: String,
}

/// What the sweep decided for one expired entry. The caller (the PM tick)
/// performs the actual nudge or escalation send.
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// Deadline extended; re-nudge the recipient.
    Retry { ack: PendingAck },
    /// Retries exhausted with a chain hop remaining; contact `target`.
    Escalate { ack: PendingAck, target: String },
    /// Terminal: promoted to the dead-letter queue.
    DeadLettered { letter: DeadLetter },
}

/// The pending-ACK ledger, one JSONL file.
pub struct AckLedger {
    paths: BusPaths,
}

impl AckLedger {
    pub fn new(paths: BusPaths) -> Self {
        Self { paths }
    }

    /// Register a pending ACK for a just-sent message that demands one.
    /// No-op for messages without `ack.required`.
    pub fn register<C: Clock>(&self, msg: &BusMessage, clock: &C) -> Result<(), BusError> {
        let Some(ack) = &msg.ack else {
            return Ok(());
        };
        if !ack.required {
            return Ok(());
        }
        let entry = PendingAck {
            message_id: msg.id.to_string(),
            from: msg.from.clone(),
            to: msg.to.clone(),
            to_role: msg.to_role.clone(),
            deadline_at: iso_from_ms(clock.epoch_ms() + ack.deadline_ms),
            deadline_ms: ack.deadline_ms,
            retries: 0,
            escalate_to_pm: ack.escalation_chain.is_some(),
            escalation_chain: ack.escalation_chain.clone(),
            escalation_level: ack.current_level,
        };
        append_jsonl(&self.paths.pending_acks_file(), &entry)?;
        Ok(())
    }

    /// Clear every entry whose message id matches a received `response`'s
    /// `correlation_id`. Returns how many entries were settled.
    pub fn settle(&self, correlation_id: &str) -> Result<usize, BusError> {
        let entries = self.load()?;
        let before = entries.len();
        let kept: Vec<PendingAck> = entries
            .into_iter()
            .filter(|e| e.message_id != correlation_id)
            .collect();
        let settled = before - kept.len();
        if settled > 0 {
            rewrite_jsonl(&self.paths.pending_acks_file(), &kept)?;
        }
        Ok(settled)
    }

    /// Advance expired entries: retry, escalate along the chain, or promote
    /// to the DLQ. Unexpired entries are untouched.
    pub fn sweep<C: Clock>(&self, clock: &C) -> Result<Vec<AckOutcome>, BusError> {
        let entries = self.load()?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let now = clock.epoch_ms();
        let mut kept = Vec::new();
        let mut outcomes = Vec::new();

        for mut entry in entries {
            let deadline = parse_iso_ms(&entry.deadline_at).unwrap_or(0);
            if now <= deadline {
                kept.push(entry);
                continue;
            }

            if entry.retries < ACK_MAX_RETRIES {
                entry.retries += 1;
                entry.deadline_at = iso_from_ms(now + entry.deadline_ms);
                outcomes.push(AckOutcome::Retry { ack: entry.clone() });
                kept.push(entry);
                continue;
            }

            // Retries exhausted: walk the chain if a hop remains
            let next_target = entry.escalation_chain.as_ref().and_then(|chain| {
                let level = entry.escalation_level.unwrap_or(0);
                chain.get(level).cloned()
            });
            if let Some(target) = next_target {
                entry.escalation_level = Some(entry.escalation_level.unwrap_or(0) + 1);
                entry.retries = 0;
                entry.deadline_at = iso_from_ms(now + entry.deadline_ms);
                outcomes.push(AckOutcome::Escalate {
                    ack: entry.clone(),
                    target,
                });
                kept.push(entry);
                continue;
            }

            let letter = DeadLetter {
                message_id: entry.message_id.clone(),
                from: entry.from.clone(),
                to: entry.to.clone(),
                reason: "ack_timeout".to_string(),
                retries: entry.retries,
                dead_at: clock.now_iso(),
            };
            append_jsonl(&self.paths.dlq_file(), &letter)?;
            tracing::warn!(message_id = %letter.message_id, "message dead-lettered");
            outcomes.push(AckOutcome::DeadLettered { letter });
        }

        rewrite_jsonl(&self.paths.pending_acks_file(), &kept)?;
        Ok(outcomes)
    }

    /// All outstanding entries.
    pub fn load(&self) -> Result<Vec<PendingAck>, BusError> {
        Ok(read_jsonl(&self.paths.pending_acks_file())?)
    }

    /// All dead letters.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, BusError> {
        Ok(read_jsonl(&self.paths.dlq_file())?)
    }
}

#[cfg(test)]
#[path = "acks_tests.rs"]
mod tests;
