// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telegram inbox/outbox records.
//!
//! Only the file contract is modeled here; the actual Telegram transport is
//! an external process that appends to the inbox and drains the outbox.

use crate::id::{ApprovalId, SessionId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Closed set of chat intents the processor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelegramIntent {
    Status,
    Ps,
    MorningReport,
    Budget,
    Approve,
    Reject,
    ApproveEscalation,
    RejectEscalation,
    Idea,
    Pause,
    Resume,
    KillAgent,
    Logs,
    Lockdown,
}

impl TelegramIntent {
    /// Parse the leading word of a chat command, e.g. `"status"` or
    /// `"approve T-12"`.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?;
        match word.to_ascii_lowercase().as_str() {
            "status" => Some(Self::Status),
            "ps" => Some(Self::Ps),
            "morning_report" | "morning" => Some(Self::MorningReport),
            "budget" => Some(Self::Budget),
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "approve_escalation" => Some(Self::ApproveEscalation),
            "reject_escalation" => Some(Self::RejectEscalation),
            "idea" => Some(Self::Idea),
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "kill_agent" | "kill" => Some(Self::KillAgent),
            "logs" => Some(Self::Logs),
            "lockdown" => Some(Self::Lockdown),
            _ => None,
        }
    }
}

/// One line of the JSONL inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub text: String,
    /// ISO-8601 UTC.
    pub ts: String,
}

/// One outbound reply, appended to the outbox for the transport to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    pub ts: String,
}

/// A human approval the PM is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub approval_id: ApprovalId,
    pub task_id: TaskId,
    /// What is being approved (e.g. `"merge"`, `"escalation"`).
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: SessionId,
    pub chat_id: i64,
    /// ISO-8601 UTC; expiry auto-escalates.
    pub expires_at: String,
    #[serde(default)]
    pub escalated: bool,
}

/// Capacity of the per-chat conversation ring buffer.
pub const CONVERSATION_TURNS: usize = 20;

/// Two-sided conversation history for one chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub chat_id: i64,
    pub turns: VecDeque<ConversationTurn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// `"human"` or `"pm"`.
    pub side: String,
    pub text: String,
    pub ts: String,
}

impl Conversation {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            turns: VecDeque::new(),
        }
    }

    pub fn push(&mut self, side: &str, text: impl Into<String>, ts: impl Into<String>) {
        if self.turns.len() >= CONVERSATION_TURNS {
            self.turns.pop_front();
        }
        self.turns.push_back(ConversationTurn {
            side: side.to_string(),
            text: text.into(),
            ts: ts.into(),
        });
    }
}

#[cfg(test)]
#[path = "telegram_tests.rs"]
mod tests;
