// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pilot-bus: the append-only JSONL message bus.
//!
//! One message is one JSON line on `messages/bus.jsonl`; appends are
//! single-line writes in append mode, so readers always see a consistent
//! prefix. Readers keep per-session cursors, acknowledgments persist the
//! cursor, and compaction archives everything every cursor has passed.

pub mod acks;
pub mod bus;
pub mod compact;
pub mod cursor;
pub mod fsio;
pub mod nudge;

use pilot_core::message::ValidationError;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use acks::{AckLedger, AckOutcome, DeadLetter, PendingAck, ACK_MAX_RETRIES};
pub use bus::{MessageBus, ReadFilter, ReadResult};
pub use compact::{compact, CompactReport};
pub use cursor::Cursor;
pub use nudge::{clear_nudge, nudge, take_nudge};

/// Errors from bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Message failed schema validation; nothing was appended.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compaction lock held by another live process; retry next tick.
    #[error("compaction lock held")]
    LockContention,
}

/// All bus paths, derived from one `messages/` root so tests can relocate
/// the tree.
#[derive(Debug, Clone)]
pub struct BusPaths {
    root: PathBuf,
}

impl BusPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Conventional location relative to a repository root.
    pub fn under_repo(repo_root: &Path) -> Self {
        Self::new(repo_root.join("messages"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bus_file(&self) -> PathBuf {
        self.root.join("bus.jsonl")
    }

    pub fn cursor_dir(&self) -> PathBuf {
        self.root.join("cursors")
    }

    pub fn cursor_file(&self, reader_id: &str) -> PathBuf {
        self.cursor_dir().join(format!("{reader_id}.cursor.json"))
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    /// Dated archive file, e.g. `archive/bus.2026-02-01.jsonl`.
    pub fn archive_file(&self, date: &str) -> PathBuf {
        self.archive_dir().join(format!("bus.{date}.jsonl"))
    }

    pub fn dlq_file(&self) -> PathBuf {
        self.root.join("dlq.jsonl")
    }

    pub fn pending_acks_file(&self) -> PathBuf {
        self.root.join("pending_acks.jsonl")
    }

    pub fn nudge_dir(&self) -> PathBuf {
        self.root.join("nudge")
    }

    pub fn nudge_file(&self, session_id: &str) -> PathBuf {
        self.nudge_dir().join(session_id)
    }

    pub fn compact_lock(&self) -> PathBuf {
        self.root.join(".compact.lock")
    }
}
