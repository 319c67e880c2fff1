// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Nudge markers: per-recipient wakeup files.
//!
//! A nudge does not carry data and does not queue — the bus is the queue.
//! Receivers poll their marker each short tick, `read` immediately when it
//! is set, then clear it.

use crate::BusPaths;
use std::fs;

/// Touch the recipient's marker file.
pub fn nudge(paths: &BusPaths, session_id: &str) -> std::io::Result<()> {
    let path = paths.nudge_file(session_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, b"1")
}

/// Check and clear in one step. Returns whether the marker was set.
pub fn take_nudge(paths: &BusPaths, session_id: &str) -> bool {
    let path = paths.nudge_file(session_id);
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(_) => false,
    }
}

/// Clear without reporting (session teardown).
pub fn clear_nudge(paths: &BusPaths, session_id: &str) {
    let _ = fs::remove_file(paths.nudge_file(session_id));
}

#[cfg(test)]
#[path = "nudge_tests.rs"]
mod tests;
