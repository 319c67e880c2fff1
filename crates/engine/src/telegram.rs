// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telegram inbox processing.
//!
//! The transport is an external process: it appends to `inbox.jsonl` and
//! drains `outbox.jsonl`. This module advances the inbox cursor, parses
//! intents, records two-sided conversation history, and tracks pending
//! approvals whose expiry auto-escalates.

use crate::paths::StateTree;
use crate::EngineError;
use pilot_bus::fsio::{append_jsonl, atomic_write_json, read_json};
use pilot_core::clock::{parse_iso_ms, Clock};
use pilot_core::telegram::{
    Conversation, InboundMessage, OutboundMessage, PendingApproval, TelegramIntent,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Seek, SeekFrom};

/// Inbox read position; advances monotonically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InboxCursor {
    byte_offset: u64,
    updated_at: String,
}

/// One parsed command awaiting dispatch by the tick loop.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundCommand {
    pub intent: TelegramIntent,
    /// Text after the intent word (task ids, freeform idea text, ...).
    pub args: String,
    pub message: InboundMessage,
}

pub struct TelegramProcessor<C: Clock> {
    tree: StateTree,
    clock: C,
}

impl<C: Clock> TelegramProcessor<C> {
    pub fn new(tree: StateTree, clock: C) -> Self {
        Self { tree, clock }
    }

    /// Read new inbox lines, advance the cursor, parse intents. Unknown
    /// intents get an immediate "unrecognized" reply; parsed commands are
    /// returned for the tick loop to dispatch.
    pub fn poll(&self) -> Result<Vec<InboundCommand>, EngineError> {
        let mut cursor: InboxCursor = read_json(&self.tree.telegram_cursor_file())
            .unwrap_or_default()
            .unwrap_or_default();

        let file = match std::fs::File::open(self.tree.telegram_inbox_file()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len();
        if cursor.byte_offset > len {
            cursor.byte_offset = len;
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(cursor.byte_offset))?;

        let mut commands = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            cursor.byte_offset += n as u64;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let inbound: InboundMessage = match serde_json::from_str(trimmed) {
                Ok(inbound) => inbound,
                Err(_) => continue,
            };

            self.record_turn(inbound.chat_id, "human", &inbound.text)?;

            match TelegramIntent::parse(&inbound.text) {
                Some(intent) => {
                    let args = inbound
                        .text
                        .trim()
                        .split_once(char::is_whitespace)
                        .map(|(_, rest)| rest.trim().to_string())
                        .unwrap_or_default();
                    commands.push(InboundCommand {
                        intent,
                        args,
                        message: inbound,
                    });
                }
                None => {
                    self.reply(
                        inbound.chat_id,
                        "Unrecognized command. Try: status, ps, budget, approve <task>, logs.",
                    )?;
                }
            }
        }

        cursor.updated_at = self.clock.now_iso();
        atomic_write_json(&self.tree.telegram_cursor_file(), &cursor)?;
        Ok(commands)
    }

    /// Append an outbound reply and record it in the conversation.
    pub fn reply(&self, chat_id: i64, text: &str) -> Result<(), EngineError> {
        let outbound = OutboundMessage {
            chat_id,
            text: text.to_string(),
            ts: self.clock.now_iso(),
        };
        append_jsonl(&self.tree.telegram_outbox_file(), &outbound)?;
        self.record_turn(chat_id, "pm", text)
    }

    fn record_turn(&self, chat_id: i64, side: &str, text: &str) -> Result<(), EngineError> {
        let mut conversations: BTreeMap<String, Conversation> =
            read_json(&self.tree.telegram_conversations_file())
                .unwrap_or_default()
                .unwrap_or_default();
        let conv = conversations
            .entry(chat_id.to_string())
            .or_insert_with(|| Conversation::new(chat_id));
        conv.push(side, text, self.clock.now_iso());
        atomic_write_json(&self.tree.telegram_conversations_file(), &conversations)?;
        Ok(())
    }

    pub fn conversation(&self, chat_id: i64) -> Option<Conversation> {
        let conversations: BTreeMap<String, Conversation> =
            read_json(&self.tree.telegram_conversations_file())
                .ok()
                .flatten()?;
        conversations.get(&chat_id.to_string()).cloned()
    }

    // ── pending approvals ────────────────────────────────────────────────

    fn load_approvals(&self) -> BTreeMap<String, PendingApproval> {
        read_json(&self.tree.telegram_approvals_file())
            .unwrap_or_default()
            .unwrap_or_default()
    }

    fn store_approvals(
        &self,
        approvals: &BTreeMap<String, PendingApproval>,
    ) -> Result<(), EngineError> {
        atomic_write_json(&self.tree.telegram_approvals_file(), approvals)?;
        Ok(())
    }

    /// Register a human approval the PM is waiting on.
    pub fn register_approval(&self, approval: PendingApproval) -> Result<(), EngineError> {
        let mut approvals = self.load_approvals();
        approvals.insert(approval.approval_id.to_string(), approval);
        self.store_approvals(&approvals)
    }

    /// Remove an approval on reply. Returns it when known.
    pub fn resolve_approval(&self, approval_id: &str) -> Result<Option<PendingApproval>, EngineError> {
        let mut approvals = self.load_approvals();
        let removed = approvals.remove(approval_id);
        if removed.is_some() {
            self.store_approvals(&approvals)?;
        }
        Ok(removed)
    }

    /// Approvals past `expires_at` not yet escalated. Each is marked
    /// escalated and returned once; the caller escalates and notifies the
    /// chat.
    pub fn expired_approvals(&self) -> Result<Vec<PendingApproval>, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let mut approvals = self.load_approvals();
        let mut expired = Vec::new();
        for approval in approvals.values_mut() {
            if approval.escalated {
                continue;
            }
            let expires = parse_iso_ms(&approval.expires_at).unwrap_or(0);
            if now_ms > expires {
                approval.escalated = true;
                expired.push(approval.clone());
            }
        }
        if !expired.is_empty() {
            self.store_approvals(&approvals)?;
        }
        Ok(expired)
    }

    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.load_approvals().into_values().collect()
    }
}

#[cfg(test)]
#[path = "telegram_tests.rs"]
mod tests;
