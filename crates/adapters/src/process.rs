// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-table access behind a trait, so liveness logic is testable
//! without real PIDs.

use std::sync::Arc;

/// OS process-table lookups used for session liveness and resurrection.
pub trait ProcessWorld: Clone + Send + Sync + 'static {
    /// True when a process with this PID exists.
    fn is_alive(&self, pid: u32) -> bool;

    /// Parent PID, when the process exists and its parent is readable.
    fn parent_of(&self, pid: u32) -> Option<u32>;

    /// This process's PID.
    fn current_pid(&self) -> u32;

    /// Ask a process to terminate (SIGTERM). Returns false when the
    /// process does not exist or cannot be signaled.
    fn terminate(&self, pid: u32) -> bool;

    /// This process's parent PID.
    fn current_parent_pid(&self) -> u32 {
        self.parent_of(self.current_pid()).unwrap_or(0)
    }

    /// Ancestor chain of a PID, nearest first, bounded in depth.
    fn ancestors_of(&self, pid: u32) -> Vec<u32> {
        let mut chain = Vec::new();
        let mut cur = pid;
        for _ in 0..32 {
            match self.parent_of(cur) {
                Some(parent) if parent > 1 => {
                    chain.push(parent);
                    cur = parent;
                }
                _ => break,
            }
        }
        chain
    }
}

/// Real process table.
#[derive(Clone, Default)]
pub struct SystemProcessWorld;

#[cfg(unix)]
impl ProcessWorld for SystemProcessWorld {
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        // Signal 0: existence probe without delivering anything
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
    }

    fn parent_of(&self, pid: u32) -> Option<u32> {
        // /proc/<pid>/stat field 4; the comm field is parenthesized and may
        // itself contain spaces, so split after the closing paren
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        let rest = stat.rsplit_once(')')?.1;
        rest.split_whitespace().nth(1)?.parse().ok()
    }

    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn terminate(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        )
        .is_ok()
    }
}

#[cfg(not(unix))]
impl ProcessWorld for SystemProcessWorld {
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }

    fn parent_of(&self, _pid: u32) -> Option<u32> {
        None
    }

    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn terminate(&self, _pid: u32) -> bool {
        false
    }
}

/// Scriptable process table for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct FakeProcessWorld {
    inner: Arc<parking_lot::Mutex<FakeInner>>,
}

#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
struct FakeInner {
    /// pid → parent pid
    alive: std::collections::HashMap<u32, u32>,
    current: u32,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeProcessWorld {
    pub fn new(current_pid: u32, current_parent: u32) -> Self {
        let world = Self::default();
        world.inner.lock().current = current_pid;
        world.add(current_pid, current_parent);
        world.add(current_parent, 1);
        world
    }

    /// Register a live process with its parent.
    pub fn add(&self, pid: u32, parent: u32) {
        self.inner.lock().alive.insert(pid, parent);
    }

    /// Kill a process.
    pub fn remove(&self, pid: u32) {
        self.inner.lock().alive.remove(&pid);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ProcessWorld for FakeProcessWorld {
    fn is_alive(&self, pid: u32) -> bool {
        self.inner.lock().alive.contains_key(&pid)
    }

    fn parent_of(&self, pid: u32) -> Option<u32> {
        self.inner.lock().alive.get(&pid).copied()
    }

    fn current_pid(&self) -> u32 {
        self.inner.lock().current
    }

    fn terminate(&self, pid: u32) -> bool {
        self.inner.lock().alive.remove(&pid).is_some()
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
