// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::clock::{Clock, FakeClock};
use crate::id::SessionId;
use crate::session::SessionRecord;

// ── Record factory functions ────────────────────────────────────────────────

/// An active session record with a deterministic fake clock.
pub fn session_record(sid: &str, pid: u32) -> SessionRecord {
    session_record_at(&FakeClock::new(), sid, pid, "backend")
}

/// An active session record stamped by the caller's clock.
pub fn session_record_at<C: Clock>(clock: &C, sid: &str, pid: u32, role: &str) -> SessionRecord {
    SessionRecord::new(
        clock,
        SessionId::new(sid),
        pid,
        1,
        format!("agent-{sid}"),
        role,
    )
}
