// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The PM hub: HTTP + WebSocket on one TCP listener.
//!
//! Agents reach the daemon here with low latency; the file bus remains the
//! fallback. Connections are handled in spawned tasks; anything that
//! mutates global state goes through the engine's single-writer components.

mod http;
mod ws;

use parking_lot::Mutex;
use pilot_adapters::ProcessWorld;
use pilot_bus::fsio::atomic_write_json;
use pilot_core::clock::Clock;
use pilot_core::id::{MessageId, SessionId, TaskId};
use pilot_core::message::{BusMessage, MessageType};
use pilot_core::wire::{AgentFrame, PmFrame};
use pilot_engine::{PmEngine, PM_SENDER};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};

/// Long-poll ceiling for `ask_pm`.
pub const ASK_PM_TIMEOUT_SECS: u64 = 130;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("bind failed: {0}")]
    Bind(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One registered agent as the hub sees it.
#[derive(Debug, Clone)]
pub struct AgentEntry {
    pub role: String,
    pub capabilities: Vec<String>,
    pub pressure: Option<f64>,
    pub claimed_task: Option<TaskId>,
    pub last_seen_ms: u64,
    /// Outbound WebSocket channel; absent for HTTP-only agents.
    pub ws: Option<mpsc::Sender<PmFrame>>,
}

/// Shared hub state: the engine plus the live-connection registry.
pub struct HubState<C: Clock, P: ProcessWorld> {
    pub engine: Arc<PmEngine<C, P>>,
    clock: C,
    agents: Mutex<HashMap<SessionId, AgentEntry>>,
    /// Parked `ask_pm` questions by correlation id.
    answers: Mutex<HashMap<String, oneshot::Sender<PmFrame>>>,
}

impl<C: Clock, P: ProcessWorld> HubState<C, P> {
    pub fn new(engine: Arc<PmEngine<C, P>>, clock: C) -> Arc<Self> {
        Arc::new(Self {
            engine,
            clock,
            agents: Mutex::new(HashMap::new()),
            answers: Mutex::new(HashMap::new()),
        })
    }

    pub fn connected_agents(&self) -> usize {
        self.agents.lock().len()
    }

    pub fn agent(&self, session_id: &SessionId) -> Option<AgentEntry> {
        self.agents.lock().get(session_id).cloned()
    }

    /// Deliver a frame to an agent: WebSocket when live, bus otherwise.
    pub fn send_to_agent(&self, session_id: &SessionId, frame: PmFrame) {
        let ws = self.agents.lock().get(session_id).and_then(|a| a.ws.clone());
        if let Some(ws) = ws {
            if ws.try_send(frame.clone()).is_ok() {
                return;
            }
        }
        let msg = BusMessage::new(MessageType::PmResponse, PM_SENDER)
            .to(session_id.as_str())
            .with_payload(serde_json::to_value(&frame).unwrap_or_default());
        let msg = match &frame {
            PmFrame::Answer { correlation_id, .. } => msg.with_correlation(correlation_id.clone()),
            _ => msg,
        };
        if let Err(e) = self.engine.bus().send(msg) {
            tracing::warn!(session_id = %session_id, error = %e, "bus delivery failed");
        }
    }

    /// Resolve an `ask_pm` question: wakes the HTTP long-poll or pushes an
    /// `answer` frame down the asking agent's socket.
    pub fn answer(&self, correlation_id: &str, session_id: &SessionId, text: &str) {
        let frame = PmFrame::Answer {
            correlation_id: correlation_id.to_string(),
            answer: text.to_string(),
        };
        if let Some(waiter) = self.answers.lock().remove(correlation_id) {
            let _ = waiter.send(frame);
            return;
        }
        self.send_to_agent(session_id, frame);
    }

    /// Handle one inbound frame. Returns the immediate reply, if the frame
    /// type has one.
    pub fn handle_frame(
        &self,
        frame: &AgentFrame,
        ws: Option<mpsc::Sender<PmFrame>>,
    ) -> Option<PmFrame> {
        match frame {
            AgentFrame::Register {
                session_id,
                role,
                capabilities,
            } => {
                self.agents.lock().insert(
                    session_id.clone(),
                    AgentEntry {
                        role: role.clone(),
                        capabilities: capabilities.clone(),
                        pressure: None,
                        claimed_task: None,
                        last_seen_ms: self.clock.epoch_ms(),
                        ws,
                    },
                );
                tracing::info!(session_id = %session_id, role, "agent registered");
                Some(PmFrame::Welcome {
                    session_id: session_id.clone(),
                    pm_version: env!("CARGO_PKG_VERSION").to_string(),
                })
            }
            AgentFrame::Heartbeat {
                session_id,
                pressure,
                claimed_task,
            } => {
                let mut agents = self.agents.lock();
                if let Some(entry) = agents.get_mut(session_id) {
                    entry.pressure = *pressure;
                    entry.claimed_task = claimed_task.clone();
                    entry.last_seen_ms = self.clock.epoch_ms();
                }
                drop(agents);
                if let Err(e) = self.engine.registry.heartbeat(session_id) {
                    tracing::debug!(session_id = %session_id, error = %e, "heartbeat for unknown session");
                }
                None
            }
            AgentFrame::TaskComplete {
                session_id,
                task_id,
                result,
            } => {
                if let Err(e) = self.engine.registry.release_task(session_id) {
                    tracing::warn!(session_id = %session_id, error = %e, "release on completion failed");
                }
                // Blockers learn about completion over the bus
                let _ = self.engine.bus().send(
                    BusMessage::broadcast(PM_SENDER, "task.completed").with_payload(
                        serde_json::json!({
                            "task_id": task_id,
                            "by": session_id,
                            "result": result,
                        }),
                    ),
                );
                None
            }
            AgentFrame::AskPm {
                session_id,
                question,
                context,
            } => {
                // Park the question; the PM side answers via `answer`
                let correlation_id = MessageId::generate(&self.clock).to_string();
                let _ = self.engine.bus().send(
                    BusMessage::new(MessageType::Query, session_id.as_str())
                        .to(PM_SENDER)
                        .with_topic("ask_pm")
                        .with_correlation(correlation_id.clone())
                        .with_payload(serde_json::json!({
                            "question": question,
                            "context": context,
                        })),
                );
                tracing::info!(session_id = %session_id, correlation_id, "ask_pm parked");
                None
            }
            AgentFrame::Checkpoint { session_id, state } => {
                let _ = self.engine.bus().send(
                    BusMessage::new(MessageType::Checkpoint, session_id.as_str())
                        .with_topic("checkpoint")
                        .with_payload(state.clone()),
                );
                None
            }
            AgentFrame::Request {
                session_id,
                payload,
                correlation_id,
            } => {
                let mut msg = BusMessage::new(MessageType::Request, session_id.as_str())
                    .to(PM_SENDER)
                    .with_payload(payload.clone());
                if let Some(cid) = correlation_id {
                    msg = msg.with_correlation(cid.clone());
                }
                let _ = self.engine.bus().send(msg);
                None
            }
        }
    }

    /// Park an HTTP long-poll waiter for `ask_pm`.
    fn park_answer(&self, correlation_id: String) -> oneshot::Receiver<PmFrame> {
        let (tx, rx) = oneshot::channel();
        self.answers.lock().insert(correlation_id, tx);
        rx
    }

    fn drop_answer(&self, correlation_id: &str) {
        self.answers.lock().remove(correlation_id);
    }

    fn unregister_ws(&self, session_id: &SessionId) {
        if let Some(entry) = self.agents.lock().get_mut(session_id) {
            entry.ws = None;
        }
    }
}

/// The running hub listener.
pub struct Hub {
    port: u16,
    shutdown: watch::Sender<bool>,
}

impl Hub {
    /// Bind, write the discovery file, and start accepting.
    pub async fn start<C: Clock, P: ProcessWorld>(
        state: Arc<HubState<C, P>>,
        preferred_port: u16,
    ) -> Result<Self, HubError> {
        let listener = match TcpListener::bind(("127.0.0.1", preferred_port)).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::warn!(preferred_port, "port in use, binding ephemeral");
                TcpListener::bind(("127.0.0.1", 0)).await.map_err(HubError::Bind)?
            }
            Err(e) => return Err(HubError::Bind(e)),
        };
        let port = listener.local_addr().map_err(HubError::Bind)?.port();

        atomic_write_json(
            &state.engine.state_tree().hub_file(),
            &serde_json::json!({
                "port": port,
                "pid": std::process::id(),
                "updated_at": state.clock.now_iso(),
            }),
        )?;

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _)) => {
                                let state = Arc::clone(&accept_state);
                                tokio::spawn(async move {
                                    if let Err(e) = http::handle_connection(stream, state).await {
                                        tracing::debug!(error = %e, "hub connection error");
                                    }
                                });
                            }
                            Err(e) => tracing::warn!(error = %e, "hub accept error"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        tracing::info!(port, "hub listening");
        Ok(Self { port, shutdown })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting and remove the discovery file.
    pub fn stop<C: Clock, P: ProcessWorld>(&self, state: &HubState<C, P>) {
        let _ = self.shutdown.send(true);
        let _ = std::fs::remove_file(state.engine.state_tree().hub_file());
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
