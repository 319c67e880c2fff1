// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub wire protocol: the closed frame sets exchanged over the WebSocket
//! (and mirrored by the HTTP endpoints).
//!
//! Every frame is one JSON object per UTF-8 text frame, tagged by `type`.
//! Required fields are checked per-type at the boundary; invalid frames get
//! an `error` reply rather than a dropped connection.

use crate::id::{SessionId, TaskId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frames an agent may send to the PM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentFrame {
    Register {
        session_id: SessionId,
        role: String,
        #[serde(default)]
        capabilities: Vec<String>,
    },
    Heartbeat {
        session_id: SessionId,
        /// Context pressure in `[0, 1]`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pressure: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        claimed_task: Option<TaskId>,
    },
    TaskComplete {
        session_id: SessionId,
        task_id: TaskId,
        #[serde(default)]
        result: serde_json::Value,
    },
    AskPm {
        session_id: SessionId,
        question: String,
        #[serde(default)]
        context: serde_json::Value,
    },
    Checkpoint {
        session_id: SessionId,
        #[serde(default)]
        state: serde_json::Value,
    },
    Request {
        session_id: SessionId,
        #[serde(default)]
        payload: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<String>,
    },
}

/// Frames the PM may send to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PmFrame {
    Welcome {
        session_id: SessionId,
        #[serde(default)]
        pm_version: String,
    },
    TaskAssign {
        task_id: TaskId,
        #[serde(default)]
        detail: serde_json::Value,
    },
    Answer {
        correlation_id: String,
        answer: String,
    },
    PlanApproval {
        task_id: TaskId,
        approved: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
    Command {
        command: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    Shutdown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    TaskClaimed {
        task_id: TaskId,
        by: SessionId,
    },
    /// A bus message relayed over the socket.
    Message {
        message: crate::message::BusMessage,
    },
    Error {
        error: String,
    },
}

/// Frame validation failures, reported back to the sender.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("unparseable frame: {0}")]
    Malformed(String),

    #[error("{frame} requires {field}")]
    MissingField {
        frame: &'static str,
        field: &'static str,
    },

    #[error("pressure must be within [0,1], got {0}")]
    PressureOutOfRange(f64),
}

impl AgentFrame {
    pub fn name(&self) -> &'static str {
        match self {
            AgentFrame::Register { .. } => "register",
            AgentFrame::Heartbeat { .. } => "heartbeat",
            AgentFrame::TaskComplete { .. } => "task_complete",
            AgentFrame::AskPm { .. } => "ask_pm",
            AgentFrame::Checkpoint { .. } => "checkpoint",
            AgentFrame::Request { .. } => "request",
        }
    }

    /// Per-type required-field checks beyond what serde enforces.
    pub fn validate(&self) -> Result<(), FrameError> {
        match self {
            AgentFrame::Register { session_id, role, .. } => {
                if session_id.as_str().is_empty() {
                    return Err(FrameError::MissingField {
                        frame: "register",
                        field: "session_id",
                    });
                }
                if role.is_empty() {
                    return Err(FrameError::MissingField {
                        frame: "register",
                        field: "role",
                    });
                }
            }
            AgentFrame::Heartbeat {
                session_id,
                pressure,
                ..
            } => {
                if session_id.as_str().is_empty() {
                    return Err(FrameError::MissingField {
                        frame: "heartbeat",
                        field: "session_id",
                    });
                }
                if let Some(p) = pressure {
                    if !(0.0..=1.0).contains(p) {
                        return Err(FrameError::PressureOutOfRange(*p));
                    }
                }
            }
            AgentFrame::TaskComplete {
                session_id,
                task_id,
                ..
            } => {
                if session_id.as_str().is_empty() {
                    return Err(FrameError::MissingField {
                        frame: "task_complete",
                        field: "session_id",
                    });
                }
                if task_id.as_str().is_empty() {
                    return Err(FrameError::MissingField {
                        frame: "task_complete",
                        field: "task_id",
                    });
                }
            }
            AgentFrame::AskPm {
                session_id,
                question,
                ..
            } => {
                if session_id.as_str().is_empty() {
                    return Err(FrameError::MissingField {
                        frame: "ask_pm",
                        field: "session_id",
                    });
                }
                if question.is_empty() {
                    return Err(FrameError::MissingField {
                        frame: "ask_pm",
                        field: "question",
                    });
                }
            }
            AgentFrame::Checkpoint { session_id, .. } => {
                if session_id.as_str().is_empty() {
                    return Err(FrameError::MissingField {
                        frame: "checkpoint",
                        field: "session_id",
                    });
                }
            }
            AgentFrame::Request { session_id, .. } => {
                if session_id.as_str().is_empty() {
                    return Err(FrameError::MissingField {
                        frame: "request",
                        field: "session_id",
                    });
                }
            }
        }
        Ok(())
    }

    /// The session this frame belongs to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            AgentFrame::Register { session_id, .. }
            | AgentFrame::Heartbeat { session_id, .. }
            | AgentFrame::TaskComplete { session_id, .. }
            | AgentFrame::AskPm { session_id, .. }
            | AgentFrame::Checkpoint { session_id, .. }
            | AgentFrame::Request { session_id, .. } => session_id,
        }
    }

    /// Parse and validate one text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: AgentFrame =
            serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        frame.validate()?;
        Ok(frame)
    }
}

impl PmFrame {
    pub fn name(&self) -> &'static str {
        match self {
            PmFrame::Welcome { .. } => "welcome",
            PmFrame::TaskAssign { .. } => "task_assign",
            PmFrame::Answer { .. } => "answer",
            PmFrame::PlanApproval { .. } => "plan_approval",
            PmFrame::Command { .. } => "command",
            PmFrame::Shutdown { .. } => "shutdown",
            PmFrame::TaskClaimed { .. } => "task_claimed",
            PmFrame::Message { .. } => "message",
            PmFrame::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
