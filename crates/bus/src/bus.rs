// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus send/read: validated one-line appends and cursor-based tail reads.

use crate::cursor::Cursor;
use crate::fsio::append_line;
use crate::{compact, nudge, BusError, BusPaths};
use parking_lot::Mutex;
use pilot_core::clock::Clock;
use pilot_core::id::MessageId;
use pilot_core::message::{BusMessage, MessageType, Priority};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};

/// Bus size that triggers auto-compaction on send.
pub const COMPACT_TRIGGER_BYTES: u64 = 100 * 1024;

/// Filters applied by `read`.
#[derive(Debug, Clone, Default)]
pub struct ReadFilter {
    pub types: Option<Vec<MessageType>>,
    pub topics: Option<Vec<String>>,
    /// The reader's role, matched against `to_role`.
    pub role: Option<String>,
    /// The reader's agent name, matched against `to_agent`.
    pub agent_name: Option<String>,
    pub include_expired: bool,
}

impl ReadFilter {
    pub fn for_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Default::default()
        }
    }

    pub fn with_types(mut self, types: Vec<MessageType>) -> Self {
        self.types = Some(types);
        self
    }
}

/// A batch of delivered messages plus the advanced (unpersisted) cursor.
///
/// The cursor is only persisted by `acknowledge`; a crash between read and
/// ack re-delivers, with `processed_ids` bounding the duplicates.
#[derive(Debug)]
pub struct ReadResult {
    pub messages: Vec<BusMessage>,
    pub cursor: Cursor,
}

/// The append-only JSONL message bus.
pub struct MessageBus<C: Clock> {
    paths: BusPaths,
    clock: C,
    compact_trigger: u64,
    /// Per-sender last assigned sequence, cached for this process.
    seq_cache: Mutex<HashMap<String, u64>>,
}

impl<C: Clock> MessageBus<C> {
    pub fn new(paths: BusPaths, clock: C) -> Self {
        Self {
            paths,
            clock,
            compact_trigger: COMPACT_TRIGGER_BYTES,
            seq_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_compact_trigger(mut self, bytes: u64) -> Self {
        self.compact_trigger = bytes;
        self
    }

    pub fn paths(&self) -> &BusPaths {
        &self.paths
    }

    /// Current bus file size in bytes.
    pub fn len(&self) -> u64 {
        std::fs::metadata(self.paths.bus_file())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate, stamp, and append one message. Returns the assigned id.
    ///
    /// Blocking-priority messages with a direct recipient also touch the
    /// recipient's nudge marker so short-tick receivers wake immediately.
    pub fn send(&self, msg: BusMessage) -> Result<MessageId, BusError> {
        let seq = self.next_sender_seq(&msg.from)?;
        let msg = msg.stamped(&self.clock, seq);
        msg.validate()?;

        let line = serde_json::to_string(&msg)?;
        append_line(&self.paths.bus_file(), &line)?;
        self.seq_cache.lock().insert(msg.from.clone(), seq);

        if msg.priority == Priority::Blocking {
            if let Some(to) = msg.to.as_deref() {
                if to != "*" {
                    let _ = nudge(&self.paths, to);
                }
            }
        }

        tracing::debug!(summary = %msg.log_summary(), seq, "bus send");

        if self.len() > self.compact_trigger {
            match compact(&self.paths, &self.clock) {
                Ok(report) => {
                    tracing::debug!(archived = report.archived_bytes, "bus auto-compacted")
                }
                Err(BusError::LockContention) => {}
                Err(e) => tracing::warn!(error = %e, "bus auto-compaction failed"),
            }
        }

        Ok(msg.id)
    }

    /// Read the bus tail for one reader, applying dedup, TTL, addressing,
    /// and the supplied filters. The returned cursor points at end-of-file.
    ///
    /// Delivery order: priority (`blocking < normal < fyi`) first; the sort
    /// is stable, so within one priority messages keep arrival order —
    /// which per sender is `sender_seq` order, since sequences are assigned
    /// at append time.
    pub fn read(&self, reader_id: &str, filter: &ReadFilter) -> Result<ReadResult, BusError> {
        let mut cursor = Cursor::load(&self.paths, &self.clock, reader_id);

        let file = match File::open(self.paths.bus_file()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReadResult {
                    messages: Vec::new(),
                    cursor,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        if cursor.byte_offset > len {
            // Offset past EOF: the file shrank under us (compaction raced a
            // stale cursor). Resume from the end rather than replaying.
            tracing::warn!(
                reader_id,
                offset = cursor.byte_offset,
                len,
                "cursor past end of bus, clamping"
            );
            cursor.byte_offset = len;
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(cursor.byte_offset))?;

        let now_ms = self.clock.epoch_ms();
        let mut messages = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            cursor.byte_offset += n as u64;
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            let msg: BusMessage = match serde_json::from_str(trimmed) {
                Ok(msg) => msg,
                // Corrupted or unknown-type lines are skipped silently
                Err(_) => continue,
            };
            cursor.last_seq += 1;

            if cursor.has_processed(msg.id.as_str()) {
                continue;
            }
            if !filter.include_expired && msg.expired(now_ms) {
                continue;
            }
            if !msg.addressed_to(
                reader_id,
                filter.role.as_deref(),
                filter.agent_name.as_deref(),
            ) {
                continue;
            }
            if let Some(types) = &filter.types {
                if !types.contains(&msg.kind) {
                    continue;
                }
            }
            if let Some(topics) = &filter.topics {
                match &msg.topic {
                    Some(topic) if topics.contains(topic) => {}
                    _ => continue,
                }
            }
            messages.push(msg);
        }

        messages.sort_by_key(|m| m.priority);

        Ok(ReadResult { messages, cursor })
    }

    /// Merge processed ids into the cursor and persist it atomically.
    pub fn acknowledge(&self, cursor: &mut Cursor, ids: &[String]) -> Result<(), BusError> {
        cursor.mark_processed(ids);
        let next_seq = self.seq_cache.lock().get(&cursor.session_id).copied();
        if next_seq.is_some() {
            cursor.cached_sender_seq = next_seq;
        }
        cursor.save(&self.paths, &self.clock)
    }

    /// Next `sender_seq` for a sender: process cache, else the sender's
    /// persisted cursor cache, else one full bus scan.
    fn next_sender_seq(&self, sender: &str) -> Result<u64, BusError> {
        if let Some(last) = self.seq_cache.lock().get(sender) {
            return Ok(last + 1);
        }
        let cursor = Cursor::load(&self.paths, &self.clock, sender);
        if let Some(cached) = cursor.cached_sender_seq {
            return Ok(cached + 1);
        }
        Ok(self.scan_max_seq(sender)? + 1)
    }

    /// One pass over the bus file for the sender's highest sequence.
    fn scan_max_seq(&self, sender: &str) -> Result<u64, BusError> {
        let file = match File::open(self.paths.bus_file()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let reader = BufReader::new(file);
        let mut max_seq = 0;
        for line in reader.lines() {
            let line = line?;
            if let Ok(msg) = serde_json::from_str::<BusMessage>(&line) {
                if msg.from == sender && msg.sender_seq > max_seq {
                    max_seq = msg.sender_seq;
                }
            }
        }
        Ok(max_seq)
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
