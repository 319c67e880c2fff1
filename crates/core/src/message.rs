// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus message model.
//!
//! One message is one JSON line on `messages/bus.jsonl`. Within a sender,
//! `sender_seq` is strictly increasing; between senders only file order is
//! authoritative. Priority sorts `blocking < normal < fyi` when a reader
//! pulls a batch.

use crate::clock::{parse_iso_ms, Clock};
use crate::id::MessageId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum serialized size of one bus message line (bytes, without newline).
pub const MAX_MESSAGE_BYTES: usize = 4000;

/// Default time-to-live for a message (1 hour).
pub const DEFAULT_TTL_MS: u64 = 60 * 60 * 1000;

/// Closed set of bus message types.
///
/// Unknown tags fail deserialization; readers skip unparseable lines, so a
/// newer writer never wedges an older reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Broadcast,
    Request,
    Response,
    Query,
    Notify,
    TaskDelegate,
    PmResponse,
    Escalation,
    Checkpoint,
}

impl MessageType {
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Broadcast => "broadcast",
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Query => "query",
            MessageType::Notify => "notify",
            MessageType::TaskDelegate => "task_delegate",
            MessageType::PmResponse => "pm_response",
            MessageType::Escalation => "escalation",
            MessageType::Checkpoint => "checkpoint",
        }
    }

    /// Types that must name at least one recipient.
    pub fn requires_recipient(&self) -> bool {
        matches!(
            self,
            MessageType::Request | MessageType::Query | MessageType::TaskDelegate
        )
    }
}

/// Message priority. Variant order is sort order: blocking first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Blocking,
    #[default]
    Normal,
    Fyi,
}

/// Acknowledgment demand attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckSpec {
    pub required: bool,
    /// Deadline for the matching `response`, relative to send time.
    pub deadline_ms: u64,
    /// Targets to escalate through when retries are exhausted (peer → PM → human).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_chain: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_level: Option<usize>,
}

impl AckSpec {
    pub fn required(deadline_ms: u64) -> Self {
        Self {
            required: true,
            deadline_ms,
            escalation_chain: None,
            current_level: None,
        }
    }

    pub fn with_chain(mut self, chain: Vec<String>) -> Self {
        self.escalation_chain = Some(chain);
        self.current_level = Some(0);
        self
    }
}

/// A single message on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: MessageId,
    /// Send time, ISO-8601 UTC.
    pub ts: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub from: String,
    /// Direct recipient session id, or `"*"` for explicit broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_ttl")]
    pub ttl_ms: u64,
    /// Per-sender monotonic sequence, assigned by the bus on send.
    #[serde(default)]
    pub sender_seq: u64,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_MS
}

/// Message schema violations, rejected before anything touches the bus file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message has empty sender")]
    EmptySender,

    #[error("response requires correlation_id")]
    MissingCorrelation,

    #[error("{kind} requires one of to/to_role/to_agent")]
    MissingRecipient { kind: &'static str },

    #[error("message is {size} bytes, limit {MAX_MESSAGE_BYTES}")]
    Oversized { size: usize },
}

impl BusMessage {
    /// Start a message of the given type. The id, ts, and sender_seq are
    /// placeholders until the bus assigns them on send.
    pub fn new(kind: MessageType, from: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(""),
            ts: String::new(),
            kind,
            from: from.into(),
            to: None,
            to_role: None,
            to_agent: None,
            topic: None,
            priority: Priority::Normal,
            ttl_ms: DEFAULT_TTL_MS,
            sender_seq: 0,
            payload: serde_json::Value::Null,
            ack: None,
            correlation_id: None,
        }
    }

    pub fn broadcast(from: impl Into<String>, topic: impl Into<String>) -> Self {
        Self::new(MessageType::Broadcast, from).with_topic(topic)
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn to_role(mut self, role: impl Into<String>) -> Self {
        self.to_role = Some(role.into());
        self
    }

    pub fn to_agent(mut self, agent: impl Into<String>) -> Self {
        self.to_agent = Some(agent.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_ack(mut self, ack: AckSpec) -> Self {
        self.ack = Some(ack);
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Stamp id, timestamp, and sender sequence. Called by the bus on send.
    pub fn stamped<C: Clock>(mut self, clock: &C, sender_seq: u64) -> Self {
        self.id = MessageId::generate(clock);
        self.ts = clock.now_iso();
        self.sender_seq = sender_seq;
        self
    }

    /// Send time in epoch milliseconds (0 for unparseable timestamps).
    pub fn ts_ms(&self) -> u64 {
        parse_iso_ms(&self.ts).unwrap_or(0)
    }

    /// True once `now` is past `ts + ttl_ms`.
    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms > self.ts_ms().saturating_add(self.ttl_ms)
    }

    /// True for `"*"` addressing or explicit broadcast type.
    pub fn is_broadcast(&self) -> bool {
        self.kind == MessageType::Broadcast || self.to.as_deref() == Some("*")
    }

    /// True when no recipient field is set at all.
    pub fn is_untargeted(&self) -> bool {
        self.to.is_none() && self.to_role.is_none() && self.to_agent.is_none()
    }

    /// Whether a reader identified by `(reader_id, role, agent_name)` should
    /// see this message.
    pub fn addressed_to(&self, reader_id: &str, role: Option<&str>, agent_name: Option<&str>) -> bool {
        if self.is_broadcast() || self.is_untargeted() {
            return true;
        }
        if self.to.as_deref() == Some(reader_id) {
            return true;
        }
        if let (Some(to_role), Some(role)) = (self.to_role.as_deref(), role) {
            if to_role == role {
                return true;
            }
        }
        if let (Some(to_agent), Some(agent)) = (self.to_agent.as_deref(), agent_name) {
            if to_agent == agent {
                return true;
            }
        }
        false
    }

    /// Schema check applied by `send` before append.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.from.is_empty() {
            return Err(ValidationError::EmptySender);
        }
        if self.kind == MessageType::Response && self.correlation_id.is_none() {
            return Err(ValidationError::MissingCorrelation);
        }
        if self.kind.requires_recipient() && self.is_untargeted() {
            return Err(ValidationError::MissingRecipient {
                kind: self.kind.name(),
            });
        }
        let size = serde_json::to_string(self).map(|s| s.len()).unwrap_or(0);
        if size > MAX_MESSAGE_BYTES {
            return Err(ValidationError::Oversized { size });
        }
        Ok(())
    }

    pub fn log_summary(&self) -> String {
        let t = self.kind.name();
        match (&self.to, &self.to_role, &self.to_agent) {
            (Some(to), _, _) => format!("{t} id={} from={} to={to}", self.id, self.from),
            (_, Some(role), _) => format!("{t} id={} from={} role={role}", self.id, self.from),
            (_, _, Some(agent)) => format!("{t} id={} from={} agent={agent}", self.id, self.from),
            _ => format!("{t} id={} from={}", self.id, self.from),
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
