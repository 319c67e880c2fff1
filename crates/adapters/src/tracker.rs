// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue-tracker adapter.
//!
//! The tracker is an external CLI; the daemon only ever asks it for ready
//! tasks and status flips. A failing or slow tracker degrades to an empty
//! answer — a tick must never wedge on it.

use async_trait::async_trait;
use pilot_core::id::TaskId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Subprocess ceiling for tracker calls.
const TRACKER_TIMEOUT: Duration = Duration::from_secs(10);

/// One ready task as the tracker reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerTask {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub priority: u32,
    /// T-shirt size: S, M, L, XL.
    #[serde(default)]
    pub complexity: String,
}

#[async_trait]
pub trait TaskTracker: Send + Sync {
    /// Tasks ready to be worked. Errors degrade to empty.
    async fn ready_tasks(&self) -> Vec<TrackerTask>;

    /// Flip a task's status. Returns false on tracker failure.
    async fn set_status(&self, task_id: &TaskId, status: &str) -> bool;
}

/// Tracker CLI subprocess adapter: `<bin> <args...> --json`.
pub struct CliTracker {
    bin: String,
}

impl CliTracker {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run(&self, args: &[&str]) -> Option<String> {
        let result = tokio::time::timeout(
            TRACKER_TIMEOUT,
            tokio::process::Command::new(&self.bin)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await;
        match result {
            Ok(Ok(output)) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Ok(output)) => {
                tracing::warn!(status = ?output.status, "tracker CLI failed");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "tracker CLI unavailable");
                None
            }
            Err(_) => {
                tracing::warn!("tracker CLI timed out");
                None
            }
        }
    }
}

#[async_trait]
impl TaskTracker for CliTracker {
    async fn ready_tasks(&self) -> Vec<TrackerTask> {
        let Some(stdout) = self.run(&["list", "--ready", "--json"]).await else {
            return Vec::new();
        };
        match serde_json::from_str(&stdout) {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable tracker output");
                Vec::new()
            }
        }
    }

    async fn set_status(&self, task_id: &TaskId, status: &str) -> bool {
        self.run(&["set-status", task_id.as_str(), status]).await.is_some()
    }
}

/// In-memory tracker for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
pub struct FakeTracker {
    tasks: parking_lot::Mutex<Vec<TrackerTask>>,
    statuses: parking_lot::Mutex<Vec<(TaskId, String)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeTracker {
    pub fn with_tasks(tasks: Vec<TrackerTask>) -> Self {
        Self {
            tasks: parking_lot::Mutex::new(tasks),
            statuses: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, task: TrackerTask) {
        self.tasks.lock().push(task);
    }

    pub fn statuses(&self) -> Vec<(TaskId, String)> {
        self.statuses.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl TaskTracker for FakeTracker {
    async fn ready_tasks(&self) -> Vec<TrackerTask> {
        self.tasks.lock().clone()
    }

    async fn set_status(&self, task_id: &TaskId, status: &str) -> bool {
        self.statuses.lock().push((task_id.clone(), status.to_string()));
        self.tasks.lock().retain(|t| &t.id != task_id);
        true
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
