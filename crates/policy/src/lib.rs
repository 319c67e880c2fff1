// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pilot-policy: the single `policy.yaml` configuration namespace.
//!
//! Policy is loaded once per process. A missing file yields defaults; a
//! malformed file is a fatal error — the daemon refuses to start on a
//! config it cannot read (silent fallback would mask typos in budgets and
//! escalation paths).

use pilot_core::escalation::{EscalationEvent, EscalationLevel, DEFAULT_PATHS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors from loading `policy.yaml`.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// Full configuration namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    #[serde(default)]
    pub orchestrator: OrchestratorPolicy,
    #[serde(default)]
    pub approval: ApprovalPolicy,
    #[serde(default)]
    pub enforcement: EnforcementPolicy,
    #[serde(default)]
    pub budget: BudgetPolicy,
    #[serde(default)]
    pub overnight: OvernightPolicy,
    #[serde(default)]
    pub telegram: TelegramPolicy,
    #[serde(default)]
    pub risk_patterns: RiskPatterns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorPolicy {
    /// Maximum concurrently spawned agents.
    pub max_agents: u32,
    pub tick_interval_ms: u64,
    /// Heartbeat age after which an active session is considered stale.
    pub stale_session_secs: u64,
    /// Task-claim lease length.
    pub lease_minutes: u64,
    /// Default hub port when no discovery file or env override exists.
    pub hub_port: u16,
    /// ACK retry ceiling before DLQ/escalation.
    pub ack_max_retries: u32,
    /// Default ACK deadline when a sender demands acknowledgment.
    pub ack_deadline_ms: u64,
    /// Bus size that triggers auto-compaction.
    pub bus_compact_bytes: u64,
    /// Zombie child PIDs older than this are reaped in the session scan.
    pub zombie_reap_secs: u64,
    /// Minimum task complexity (S/M/L/XL) that warrants auto-research.
    pub research_min_complexity: String,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            max_agents: 6,
            tick_interval_ms: 30_000,
            stale_session_secs: 300,
            lease_minutes: 30,
            hub_port: 3847,
            ack_max_retries: 3,
            ack_deadline_ms: 60_000,
            bus_compact_bytes: 100 * 1024,
            zombie_reap_secs: 30,
            research_min_complexity: "M".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApprovalPolicy {
    /// Whether merges require a peer-review gate.
    pub require_peer_review: bool,
    /// Diffs at or under this many lines get the lightweight review pass.
    pub lightweight_diff_lines: u64,
    /// Quality score floor per area.
    pub quality_threshold: f64,
    /// Per-area threshold overrides; area is an opaque caller key.
    pub area_thresholds: HashMap<String, f64>,
    /// Grace period for new tasks.
    pub grace_days: u32,
    /// Threshold relaxation inside the grace period (fraction).
    pub grace_relaxation: f64,
    /// Maximum per-commit score drop before rejection.
    pub regression_cap: f64,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            require_peer_review: true,
            lightweight_diff_lines: 200,
            quality_threshold: 0.70,
            area_thresholds: HashMap::new(),
            grace_days: 7,
            grace_relaxation: 0.15,
            regression_cap: 0.05,
        }
    }
}

/// One event type's escalation path configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationPath {
    pub path: Vec<EscalationLevel>,
    pub cooldown_secs: u64,
    pub auto_deescalate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnforcementPolicy {
    /// Per-event overrides of the built-in escalation paths, keyed by event
    /// name (`drift`, `test_failure`, ...).
    pub escalations: HashMap<String, EscalationPath>,
}

impl EnforcementPolicy {
    /// Resolve the escalation path for an event: override if present,
    /// built-in default otherwise.
    pub fn escalation_for(&self, event: EscalationEvent) -> EscalationPath {
        if let Some(path) = self.escalations.get(event.name()) {
            return path.clone();
        }
        let defaults = DEFAULT_PATHS
            .iter()
            .find(|d| d.event == event)
            .unwrap_or(&DEFAULT_PATHS[0]);
        EscalationPath {
            path: defaults.path.to_vec(),
            cooldown_secs: defaults.cooldown_secs,
            auto_deescalate: defaults.auto_deescalate,
        }
    }
}

/// Token thresholds for one budget scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetScope {
    pub warn_tokens: u64,
    pub block_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetPolicy {
    pub cost_per_million_tokens: f64,
    pub per_task: BudgetScope,
    pub per_agent_day: BudgetScope,
    pub per_day: BudgetScope,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            cost_per_million_tokens: 10.0,
            per_task: BudgetScope {
                warn_tokens: 500_000,
                block_tokens: 1_000_000,
            },
            per_agent_day: BudgetScope {
                warn_tokens: 2_000_000,
                block_tokens: 4_000_000,
            },
            per_day: BudgetScope {
                warn_tokens: 8_000_000,
                block_tokens: 16_000_000,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OvernightPolicy {
    /// Consecutive failures before a task is skipped.
    pub task_error_budget: u32,
    /// Total errors before the run stops spawning.
    pub global_error_budget: u32,
    /// Minutes after drain request before the run is forcibly completed.
    pub drain_timeout_minutes: u64,
}

impl Default for OvernightPolicy {
    fn default() -> Self {
        Self {
            task_error_budget: 3,
            global_error_budget: 10,
            drain_timeout_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramPolicy {
    pub enabled: bool,
    /// Minutes before a pending approval auto-escalates.
    pub approval_timeout_minutes: u64,
}

impl Default for TelegramPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            approval_timeout_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskPatterns {
    /// Globs of paths whose edits always need review.
    pub paths: Vec<String>,
    /// Substrings in commands that mark a tool call risky.
    pub commands: Vec<String>,
}

impl Policy {
    /// Load from `policy.yaml`. Missing file → defaults; unreadable or
    /// unparseable file → error (fatal at daemon startup).
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(PolicyError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        let policy: Policy = serde_yaml::from_str(&text).map_err(|e| PolicyError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        policy.validate()?;
        Ok(policy)
    }

    /// Sanity checks that serde cannot express.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.orchestrator.max_agents == 0 {
            return Err(PolicyError::Invalid("orchestrator.max_agents must be > 0".into()));
        }
        if self.orchestrator.tick_interval_ms == 0 {
            return Err(PolicyError::Invalid(
                "orchestrator.tick_interval_ms must be > 0".into(),
            ));
        }
        for (scope, limits) in [
            ("per_task", &self.budget.per_task),
            ("per_agent_day", &self.budget.per_agent_day),
            ("per_day", &self.budget.per_day),
        ] {
            if limits.warn_tokens > limits.block_tokens {
                return Err(PolicyError::Invalid(format!(
                    "budget.{scope}: warn_tokens exceeds block_tokens"
                )));
            }
        }
        for (name, esc) in &self.enforcement.escalations {
            if esc.path.is_empty() {
                return Err(PolicyError::Invalid(format!(
                    "enforcement.escalations.{name}: empty path"
                )));
            }
        }
        Ok(())
    }

    pub fn lease_ms(&self) -> u64 {
        self.orchestrator.lease_minutes * 60 * 1000
    }

    pub fn approval_timeout_ms(&self) -> u64 {
        self.telegram.approval_timeout_minutes * 60 * 1000
    }

    pub fn drain_timeout_ms(&self) -> u64 {
        self.overnight.drain_timeout_minutes * 60 * 1000
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
