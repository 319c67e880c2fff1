// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pilot-engine: orchestration logic over the state tree and the bus.
//!
//! The PM daemon embeds this crate and drives [`tick::PmEngine`] from its
//! tick loop; agent helpers embed the session registry and cost tracker
//! directly. All global decisions (escalations, budgets, spawns) are
//! single-writer: only the daemon's tick mutates them.

pub mod board;
pub mod budget;
pub mod escalation;
pub mod overnight;
pub mod paths;
pub mod patterns;
pub mod registry;
pub mod review;
pub mod telegram;
pub mod tick;

pub use board::{AgentRegistry, RoleMatch, StatusBoard};
pub use budget::{CostSummary, CostTracker};
pub use escalation::{EscalationAction, Escalator, HumanEscalation, PM_SENDER};
pub use overnight::{OvernightError, OvernightStore};
pub use paths::StateTree;
pub use patterns::PatternLibrary;
pub use registry::{RegistryError, SessionRegistry};
pub use review::{quality_gate, ReviewStore};
pub use telegram::{InboundCommand, TelegramProcessor};
pub use tick::{ClearedCheck, DriftCheck, PmEngine, PmOptions, ScanOutcome, TickReport};

use thiserror::Error;

/// Engine-level error: state I/O plus bus propagation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bus error: {0}")]
    Bus(#[from] pilot_bus::BusError),

    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
}
