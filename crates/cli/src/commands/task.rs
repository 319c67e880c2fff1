// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pilot claim-task` / `pilot release-task`
//!
//! Runs inside an agent helper: identifies the current session (creating
//! or resurrecting one as needed) and claims through the registry.

use anyhow::Result;
use pilot_adapters::SystemProcessWorld;
use pilot_bus::{BusPaths, MessageBus};
use pilot_core::claim::ClaimOutcome;
use pilot_core::clock::SystemClock;
use pilot_core::id::TaskId;
use pilot_engine::{SessionRegistry, StateTree};
use pilot_policy::Policy;
use std::path::Path;
use std::sync::Arc;

fn registry(repo_root: &Path) -> Result<SessionRegistry<SystemClock, SystemProcessWorld>> {
    let policy = Policy::load(&repo_root.join("policy.yaml"))?;
    let clock = SystemClock;
    let bus = Arc::new(MessageBus::new(BusPaths::under_repo(repo_root), clock.clone()));
    Ok(SessionRegistry::new(
        StateTree::under_repo(repo_root),
        bus,
        clock,
        SystemProcessWorld,
        policy.lease_ms(),
    ))
}

pub fn claim(repo_root: &Path, task_id: &str) -> Result<bool> {
    let registry = registry(repo_root)?;
    let session = registry.resolve_current_session("cli", "agent")?;
    let outcome = registry.claim_task(&session.session_id, &TaskId::new(task_id))?;

    match &outcome {
        ClaimOutcome::Claimed { claim } => {
            println!(
                "{}",
                serde_json::json!({
                    "success": true,
                    "session_id": session.session_id,
                    "task_id": claim.task_id,
                    "lease_expires_at": claim.lease_expires_at,
                })
            );
            Ok(true)
        }
        ClaimOutcome::AlreadyClaimed { by } => {
            println!(
                "{}",
                serde_json::json!({
                    "success": false,
                    "reason": "already_claimed",
                    "by": by,
                })
            );
            Ok(false)
        }
    }
}

pub fn release(repo_root: &Path) -> Result<bool> {
    let registry = registry(repo_root)?;
    let session = registry.resolve_current_session("cli", "agent")?;
    let released = registry.release_task(&session.session_id)?;

    println!(
        "{}",
        serde_json::json!({
            "success": true,
            "session_id": session.session_id,
            "released": released,
        })
    );
    Ok(true)
}
