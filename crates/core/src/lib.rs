// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pilot-core: Shared domain types for the Pilot orchestration runtime.
//!
//! Everything here is pure data plus small helpers — no I/O. The state
//! tree layout, the bus file format, and the hub wire protocol all
//! serialize types defined in this crate.

pub mod board;
pub mod claim;
pub mod clock;
pub mod cost;
pub mod escalation;
pub mod id;
pub mod message;
pub mod overnight;
pub mod patterns;
pub mod review;
pub mod session;
pub mod telegram;
pub mod time_fmt;
pub mod wire;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use board::{AgentRegistryEntry, AgentStatus};
pub use claim::{ClaimOutcome, TaskClaim};
pub use clock::{parse_iso_ms, Clock, FakeClock, SystemClock};
pub use cost::{
    cost_usd, tokens_for_bytes, AgentCost, BudgetStatus, DayCost, SessionCost, TaskCost,
    COST_PER_MILLION_TOKENS,
};
pub use escalation::{
    event_key, BlockMarker, EscalationEvent, EscalationLevel, EscalationState, EventKey,
    PathDefaults, DEFAULT_PATHS,
};
pub use id::{
    base36, ApprovalId, IdGen, MessageId, RunId, SequentialIdGen, SessionId, ShortId, TaskId,
    UuidIdGen,
};
pub use message::{
    AckSpec, BusMessage, MessageType, Priority, ValidationError, DEFAULT_TTL_MS,
    MAX_MESSAGE_BYTES,
};
pub use overnight::{MorningReport, OvernightRun, RunStatus, TaskErrorState};
pub use patterns::{classify_task, task_keywords, DecompositionPattern, TaskKind};
pub use review::{QualityCheck, QualityVerdict, ReviewGate, ReviewStatus};
pub use session::{iso_from_ms, SessionRecord, SessionStatus, DEFAULT_LEASE_MS};
pub use telegram::{
    Conversation, ConversationTurn, InboundMessage, OutboundMessage, PendingApproval,
    TelegramIntent, CONVERSATION_TURNS,
};
pub use time_fmt::{format_elapsed, format_elapsed_ms};
pub use wire::{AgentFrame, FrameError, PmFrame};
