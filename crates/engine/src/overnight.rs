// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overnight-run state machine.
//!
//! One run at a time. Per-task and global error budgets bound how much an
//! unattended night can burn; drain mode stops new spawns and force-
//! completes after a timeout. The morning report aggregates the night.

use crate::paths::StateTree;
use crate::EngineError;
use pilot_bus::fsio::{atomic_write_json, read_json};
use pilot_core::clock::{parse_iso_ms, Clock};
use pilot_core::id::{RunId, TaskId};
use pilot_core::overnight::{MorningReport, OvernightRun, RunStatus, TaskErrorState};
use pilot_policy::OvernightPolicy;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OvernightError {
    #[error("a run is already active: {0}")]
    RunActive(RunId),

    #[error("no active run")]
    NoActiveRun,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<std::io::Error> for OvernightError {
    fn from(e: std::io::Error) -> Self {
        OvernightError::Engine(e.into())
    }
}

pub struct OvernightStore<C: Clock> {
    tree: StateTree,
    clock: C,
    policy: OvernightPolicy,
}

impl<C: Clock> OvernightStore<C> {
    pub fn new(tree: StateTree, clock: C, policy: OvernightPolicy) -> Self {
        Self {
            tree,
            clock,
            policy,
        }
    }

    /// Create and activate a run. Fails while another run is active.
    pub fn plan_and_queue(&self, task_ids: Vec<TaskId>) -> Result<OvernightRun, OvernightError> {
        if let Some(active) = self.active_run() {
            return Err(OvernightError::RunActive(active.run_id));
        }
        let run = OvernightRun {
            run_id: RunId::generate(&self.clock),
            status: RunStatus::Active,
            task_ids,
            tasks_completed: Vec::new(),
            tasks_failed: Vec::new(),
            tasks_in_progress: Vec::new(),
            total_errors: 0,
            drain_requested: false,
            drain_requested_at: None,
            started_at: self.clock.now_iso(),
            completed_at: None,
            updated_at: self.clock.now_iso(),
        };
        self.save(&run)?;
        Ok(run)
    }

    pub fn save(&self, run: &OvernightRun) -> Result<(), OvernightError> {
        atomic_write_json(&self.tree.overnight_run_file(run.run_id.as_str()), run)?;
        Ok(())
    }

    pub fn load(&self, run_id: &RunId) -> Option<OvernightRun> {
        read_json(&self.tree.overnight_run_file(run_id.as_str()))
            .ok()
            .flatten()
    }

    /// The single active run, if any.
    pub fn active_run(&self) -> Option<OvernightRun> {
        let Ok(entries) = std::fs::read_dir(self.tree.overnight_dir()) else {
            return None;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Ok(Some(run)) = read_json::<OvernightRun>(&path) {
                if run.is_active() {
                    return Some(run);
                }
            }
        }
        None
    }

    /// Record a task attempt outcome. Success clears the task's
    /// consecutive-error count; failure bumps it and the run total, and
    /// marks the task over budget past the per-task ceiling.
    pub fn record_result(
        &self,
        run: &mut OvernightRun,
        task_id: &TaskId,
        success: bool,
        error: Option<&str>,
    ) -> Result<(), OvernightError> {
        run.tasks_in_progress.retain(|t| t != task_id);

        let error_path = self.tree.overnight_error_file(task_id.as_str());
        let mut errors: TaskErrorState = read_json(&error_path)
            .unwrap_or_default()
            .unwrap_or(TaskErrorState {
                task_id: task_id.clone(),
                consecutive_errors: 0,
                over_budget: false,
                last_error: None,
                updated_at: String::new(),
            });

        if success {
            if !run.tasks_completed.contains(task_id) {
                run.tasks_completed.push(task_id.clone());
            }
            errors.consecutive_errors = 0;
            errors.last_error = None;
        } else {
            run.total_errors += 1;
            errors.consecutive_errors += 1;
            errors.last_error = error.map(String::from);
            if errors.consecutive_errors >= self.policy.task_error_budget {
                errors.over_budget = true;
                if !run.tasks_failed.contains(task_id) {
                    run.tasks_failed.push(task_id.clone());
                }
                tracing::warn!(task_id = %task_id, "task over error budget, skipping");
            }
        }
        errors.updated_at = self.clock.now_iso();
        atomic_write_json(&error_path, &errors)?;

        run.updated_at = self.clock.now_iso();
        self.save(run)?;
        Ok(())
    }

    /// Whether the run may spawn new work: active, not draining, global
    /// error budget not exhausted.
    pub fn may_spawn(&self, run: &OvernightRun) -> bool {
        run.is_active()
            && !run.drain_requested
            && run.total_errors < self.policy.global_error_budget
    }

    /// Tasks still eligible: remaining and not over their error budget.
    pub fn eligible_tasks(&self, run: &OvernightRun) -> Vec<TaskId> {
        run.remaining()
            .into_iter()
            .filter(|task_id| {
                read_json::<TaskErrorState>(&self.tree.overnight_error_file(task_id.as_str()))
                    .unwrap_or_default()
                    .map(|e| !e.over_budget)
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Stop new spawns; active agents finish.
    pub fn request_drain(&self, run: &mut OvernightRun) -> Result<(), OvernightError> {
        if !run.drain_requested {
            run.drain_requested = true;
            run.drain_requested_at = Some(self.clock.now_iso());
            run.updated_at = self.clock.now_iso();
            self.save(run)?;
        }
        Ok(())
    }

    /// Force-complete a drained run past the drain timeout.
    pub fn drain_expired(&self, run: &OvernightRun) -> bool {
        let Some(requested_at) = run.drain_requested_at.as_deref().and_then(parse_iso_ms)
        else {
            return false;
        };
        self.clock.epoch_ms().saturating_sub(requested_at)
            > self.policy.drain_timeout_minutes * 60_000
    }

    pub fn complete(&self, run: &mut OvernightRun) -> Result<(), OvernightError> {
        run.status = RunStatus::Completed;
        run.completed_at = Some(self.clock.now_iso());
        run.updated_at = self.clock.now_iso();
        self.save(run)?;
        Ok(())
    }

    /// Aggregate the night into the morning report and persist it.
    pub fn morning_report(
        &self,
        run: &OvernightRun,
        total_tokens: u64,
        total_cost_usd: f64,
        commits: Vec<String>,
        outstanding_human_escalations: u64,
    ) -> Result<MorningReport, OvernightError> {
        let skipped: Vec<TaskId> = run
            .task_ids
            .iter()
            .filter(|task_id| {
                read_json::<TaskErrorState>(&self.tree.overnight_error_file(task_id.as_str()))
                    .unwrap_or_default()
                    .map(|e| e.over_budget)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let report = MorningReport {
            run_id: run.run_id.clone(),
            completed: run.tasks_completed.clone(),
            failed: run.tasks_failed.clone(),
            skipped_over_budget: skipped,
            total_errors: run.total_errors,
            total_tokens,
            total_cost_usd,
            commits,
            outstanding_human_escalations,
            generated_at: self.clock.now_iso(),
        };
        atomic_write_json(&self.tree.overnight_report_file(run.run_id.as_str()), &report)?;
        Ok(report)
    }
}

#[cfg(test)]
#[path = "overnight_tests.rs"]
mod tests;
