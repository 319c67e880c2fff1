// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent child-process spawning and zombie reaping.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("spawn failed: {0}")]
    Io(#[from] std::io::Error),
}

/// What to launch for one agent.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
}

struct Tracked {
    child: Child,
    spawned_at_ms: u64,
}

/// Tracks spawned agent children so the daemon can bound concurrency and
/// reap exited processes.
pub struct AgentSpawner {
    children: Mutex<HashMap<u32, Tracked>>,
}

impl Default for AgentSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentSpawner {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Launch a child and track it. Returns the child PID.
    pub fn spawn(&self, spec: &SpawnSpec, now_ms: u64) -> Result<u32, SpawnError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        // The child outlives individual connector restarts; never kill it
        // just because the handle drops
        cmd.kill_on_drop(false);

        let child = cmd.spawn()?;
        let pid = child.id().unwrap_or(0);
        self.children.lock().insert(
            pid,
            Tracked {
                child,
                spawned_at_ms: now_ms,
            },
        );
        tracing::info!(pid, command = %spec.command, "agent spawned");
        Ok(pid)
    }

    /// Number of tracked children that have not exited.
    pub fn live_count(&self) -> usize {
        let mut children = self.children.lock();
        children.retain(|_, t| matches!(t.child.try_wait(), Ok(None)));
        children.len()
    }

    /// Reap exited children older than `min_age_ms`. Returns reaped PIDs.
    pub fn reap(&self, now_ms: u64, min_age_ms: u64) -> Vec<u32> {
        let mut reaped = Vec::new();
        let mut children = self.children.lock();
        children.retain(|pid, tracked| {
            let old_enough = now_ms.saturating_sub(tracked.spawned_at_ms) >= min_age_ms;
            match tracked.child.try_wait() {
                Ok(Some(status)) if old_enough => {
                    tracing::info!(pid, ?status, "agent child reaped");
                    reaped.push(*pid);
                    false
                }
                _ => true,
            }
        });
        reaped
    }

    /// Request termination of one child.
    pub fn kill(&self, pid: u32) -> bool {
        let mut children = self.children.lock();
        if let Some(tracked) = children.get_mut(&pid) {
            let _ = tracked.child.start_kill();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[path = "spawner_tests.rs"]
mod tests;
