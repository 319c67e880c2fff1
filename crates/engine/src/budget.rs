// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cost recording and budget checks.
//!
//! Counters only increase. Tokens are estimated at 4 output bytes per
//! token; the check combines per-task, per-agent-per-day, and per-day
//! policies and reports the most restrictive result.

use crate::paths::StateTree;
use crate::EngineError;
use pilot_bus::fsio::{atomic_write_json, read_json};
use pilot_core::clock::Clock;
use pilot_core::cost::{cost_usd, AgentCost, BudgetStatus, TaskCost};
use pilot_core::id::{SessionId, TaskId};
use pilot_policy::BudgetPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Daily + per-task summary published to the shared cost channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummary {
    pub date: String,
    pub total_tokens_today: u64,
    pub total_cost_usd_today: f64,
    /// task id → total tokens.
    pub tasks: BTreeMap<String, u64>,
    /// session id → tokens today.
    pub agents: BTreeMap<String, u64>,
    pub updated_at: String,
}

pub struct CostTracker<C: Clock> {
    tree: StateTree,
    clock: C,
    policy: BudgetPolicy,
}

impl<C: Clock> CostTracker<C> {
    pub fn new(tree: StateTree, clock: C, policy: BudgetPolicy) -> Self {
        Self {
            tree,
            clock,
            policy,
        }
    }

    /// Record one tool call's output bytes against a task and its agent.
    pub fn record(
        &self,
        session_id: &SessionId,
        task_id: &TaskId,
        bytes: u64,
    ) -> Result<(), EngineError> {
        let now = self.clock.now_iso();
        let today = self.clock.today();

        let mut task_cost = self
            .load_task(task_id)?
            .unwrap_or_else(|| TaskCost::new(task_id.clone()));
        task_cost.record(session_id, bytes);
        task_cost.updated_at = now.clone();
        atomic_write_json(&self.tree.task_cost_file(task_id.as_str()), &task_cost)?;

        let mut agent_cost = self
            .load_agent(session_id)?
            .unwrap_or_else(|| AgentCost::new(session_id.clone()));
        agent_cost.record(&today, task_id, bytes);
        agent_cost.updated_at = now;
        atomic_write_json(&self.tree.agent_cost_file(session_id.as_str()), &agent_cost)?;

        Ok(())
    }

    pub fn load_task(&self, task_id: &TaskId) -> Result<Option<TaskCost>, EngineError> {
        Ok(read_json(&self.tree.task_cost_file(task_id.as_str()))?)
    }

    pub fn load_agent(&self, session_id: &SessionId) -> Result<Option<AgentCost>, EngineError> {
        Ok(read_json(&self.tree.agent_cost_file(session_id.as_str()))?)
    }

    /// Combined budget check for one agent working one task.
    pub fn check(&self, session_id: &SessionId, task_id: &TaskId) -> BudgetStatus {
        let today = self.clock.today();

        let task_tokens = self
            .load_task(task_id)
            .ok()
            .flatten()
            .map(|t| t.total_tokens)
            .unwrap_or(0);
        let agent_today = self
            .load_agent(session_id)
            .ok()
            .flatten()
            .map(|a| a.tokens_on(&today))
            .unwrap_or(0);
        let day_total = self.day_total(&today);

        scope_status("per_task", task_tokens, &self.policy.per_task)
            .combine(scope_status(
                "per_agent_day",
                agent_today,
                &self.policy.per_agent_day,
            ))
            .combine(scope_status("per_day", day_total, &self.policy.per_day))
    }

    /// Tokens spent today across every agent.
    pub fn day_total(&self, date: &str) -> u64 {
        let mut total = 0;
        let Ok(entries) = std::fs::read_dir(self.tree.agent_costs_dir()) else {
            return 0;
        };
        for entry in entries.flatten() {
            if let Ok(Some(agent)) = read_json::<AgentCost>(&entry.path()) {
                total += agent.tokens_on(date);
            }
        }
        total
    }

    /// Publish the daily + per-task summary to the shared cost channel.
    pub fn publish_summary(&self) -> Result<CostSummary, EngineError> {
        let today = self.clock.today();
        let mut agents = BTreeMap::new();
        let mut tasks = BTreeMap::new();
        let mut total_today = 0;

        if let Ok(entries) = std::fs::read_dir(self.tree.agent_costs_dir()) {
            for entry in entries.flatten() {
                if let Ok(Some(agent)) = read_json::<AgentCost>(&entry.path()) {
                    let tokens = agent.tokens_on(&today);
                    total_today += tokens;
                    agents.insert(agent.session_id.to_string(), tokens);
                    for task in &agent.tasks_worked {
                        if let Ok(Some(task_cost)) = self.load_task(task) {
                            tasks.insert(task.to_string(), task_cost.total_tokens);
                        }
                    }
                }
            }
        }

        let summary = CostSummary {
            date: today,
            total_tokens_today: total_today,
            total_cost_usd_today: cost_usd(total_today, self.policy.cost_per_million_tokens),
            tasks,
            agents,
            updated_at: self.clock.now_iso(),
        };
        atomic_write_json(&self.tree.cost_channel_file(), &summary)?;
        Ok(summary)
    }
}

fn scope_status(scope: &str, tokens: u64, limits: &pilot_policy::BudgetScope) -> BudgetStatus {
    if tokens >= limits.block_tokens {
        BudgetStatus::Exceeded {
            scope: scope.to_string(),
            tokens,
            limit: limits.block_tokens,
        }
    } else if tokens >= limits.warn_tokens {
        BudgetStatus::Warning {
            scope: scope.to_string(),
            tokens,
            limit: limits.warn_tokens,
        }
    } else {
        BudgetStatus::Ok
    }
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
