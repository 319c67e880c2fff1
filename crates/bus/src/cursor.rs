// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-reader bus cursors.
//!
//! A cursor records how far one reader has consumed the bus (`byte_offset`),
//! which message ids it has processed (for at-least-once dedup), and the
//! reader's own cached sender sequence. A corrupt cursor recovers to offset
//! 0 of the current file — the archive boundary after compaction — never to
//! a replay of archived history.

use crate::fsio::{atomic_write_json, read_json};
use crate::{BusError, BusPaths};
use pilot_core::clock::Clock;
use serde::{Deserialize, Serialize};

/// Cap on remembered processed ids (most recent kept).
pub const PROCESSED_IDS_CAP: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub session_id: String,
    /// Count of messages this reader has observed, monotonic.
    pub last_seq: u64,
    /// Byte position in the current bus file; rebased on compaction.
    pub byte_offset: u64,
    /// Most-recent processed message ids, newest last.
    #[serde(default)]
    pub processed_ids: Vec<String>,
    /// The reader's own next sender_seq, cached across restarts.
    #[serde(rename = "_cached_sender_seq", default, skip_serializing_if = "Option::is_none")]
    pub cached_sender_seq: Option<u64>,
    pub updated_at: String,
}

impl Cursor {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            last_seq: 0,
            byte_offset: 0,
            processed_ids: Vec::new(),
            cached_sender_seq: None,
            updated_at: String::new(),
        }
    }

    pub fn has_processed(&self, id: &str) -> bool {
        self.processed_ids.iter().any(|p| p == id)
    }

    /// Merge acknowledged ids, trimming to the most recent
    /// [`PROCESSED_IDS_CAP`].
    pub fn mark_processed(&mut self, ids: &[String]) {
        for id in ids {
            if !self.has_processed(id) {
                self.processed_ids.push(id.clone());
            }
        }
        if self.processed_ids.len() > PROCESSED_IDS_CAP {
            let excess = self.processed_ids.len() - PROCESSED_IDS_CAP;
            self.processed_ids.drain(..excess);
        }
    }

    /// Load a reader's cursor. Missing file → fresh cursor at offset 0.
    /// Unparseable file → fresh cursor at offset 0 (the archive boundary),
    /// logged; offsets past end-of-file are clamped by the reader.
    pub fn load<C: Clock>(paths: &BusPaths, clock: &C, reader_id: &str) -> Cursor {
        let path = paths.cursor_file(reader_id);
        match read_json::<Cursor>(&path) {
            Ok(Some(cursor)) => cursor,
            Ok(None) => Cursor::new(reader_id),
            Err(e) => {
                tracing::warn!(reader_id, error = %e, "corrupt cursor, resetting to archive boundary");
                let mut fresh = Cursor::new(reader_id);
                fresh.updated_at = clock.now_iso();
                fresh
            }
        }
    }

    /// Persist atomically.
    pub fn save<C: Clock>(&mut self, paths: &BusPaths, clock: &C) -> Result<(), BusError> {
        self.updated_at = clock.now_iso();
        atomic_write_json(&paths.cursor_file(&self.session_id), self)?;
        Ok(())
    }

    /// Delete a reader's cursor (owning session ended).
    pub fn delete(paths: &BusPaths, reader_id: &str) -> Result<(), BusError> {
        match std::fs::remove_file(paths.cursor_file(reader_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All cursors currently on disk.
    pub fn load_all(paths: &BusPaths) -> Vec<Cursor> {
        let dir = paths.cursor_dir();
        let mut cursors = Vec::new();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return cursors,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Ok(Some(cursor)) = read_json::<Cursor>(&path) {
                cursors.push(cursor);
            }
        }
        cursors
    }
}

#[cfg(test)]
#[path = "cursor_tests.rs"]
mod tests;
