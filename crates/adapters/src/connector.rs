// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-side hub connector.
//!
//! `connect` registers over HTTP, then keeps a background WebSocket to the
//! hub. `send` prefers the socket, falls back to the matching HTTP
//! endpoint, and finally to a bus broadcast, so an agent never loses the
//! ability to report just because the hub is down. On every (re)connect
//! the bus is reconciled first: messages addressed to this session that
//! arrived during the disconnect are delivered before live traffic.

use crate::http::{self, HttpError};
use futures_util::{SinkExt, StreamExt};
use pilot_bus::{BusError, MessageBus, ReadFilter};
use pilot_core::clock::Clock;
use pilot_core::id::SessionId;
use pilot_core::message::{BusMessage, MessageType};
use pilot_core::wire::{AgentFrame, PmFrame};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

/// Reconnect backoff: 1s, 2s, 4s, ... capped at 30s.
const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Long-poll ceiling for `ask_pm`.
const ASK_PM_TIMEOUT: Duration = Duration::from_secs(130);

/// Default hub port when neither the discovery file nor the environment
/// override is present.
pub const DEFAULT_HUB_PORT: u16 = 3847;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("hub unreachable")]
    Unreachable,

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identity and target for one agent's connector.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub session_id: SessionId,
    pub role: String,
    pub agent_name: String,
    pub capabilities: Vec<String>,
    /// Hub address, `host:port`.
    pub hub_addr: String,
}

/// Resolve the hub port: `state/orchestrator/pm-hub.json`, then
/// `PILOT_PM_PORT`, then the default.
pub fn discover_hub_port(repo_root: &Path) -> u16 {
    let hub_file = repo_root.join("state/orchestrator/pm-hub.json");
    if let Ok(text) = std::fs::read_to_string(&hub_file) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(port) = value.get("port").and_then(|p| p.as_u64()) {
                return port as u16;
            }
        }
    }
    if let Ok(port) = std::env::var("PILOT_PM_PORT") {
        if let Ok(port) = port.parse() {
            return port;
        }
    }
    DEFAULT_HUB_PORT
}

struct Shared {
    ws_out: parking_lot::Mutex<Option<mpsc::Sender<String>>>,
    http_up: AtomicBool,
    ws_up: AtomicBool,
}

/// The connector handle owned by one agent helper process.
pub struct AgentConnector<C: Clock> {
    config: ConnectorConfig,
    bus: Arc<MessageBus<C>>,
    shared: Arc<Shared>,
    handler_tx: mpsc::Sender<PmFrame>,
    /// Intentional-disconnect flag; flips the background task off.
    disconnect_tx: watch::Sender<bool>,
}

impl<C: Clock> AgentConnector<C> {
    /// Build a connector. Incoming PM frames arrive on the returned
    /// receiver once `connect` has run.
    pub fn new(
        config: ConnectorConfig,
        bus: Arc<MessageBus<C>>,
    ) -> (Self, mpsc::Receiver<PmFrame>) {
        let (handler_tx, handler_rx) = mpsc::channel(64);
        let (disconnect_tx, _) = watch::channel(false);
        let connector = Self {
            config,
            bus,
            shared: Arc::new(Shared {
                ws_out: parking_lot::Mutex::new(None),
                http_up: AtomicBool::new(false),
                ws_up: AtomicBool::new(false),
            }),
            handler_tx,
            disconnect_tx,
        };
        (connector, handler_rx)
    }

    /// Register over HTTP, then launch the background WebSocket upgrade.
    /// Registration failure is reported but the socket loop still runs —
    /// it keeps retrying with backoff until `disconnect`.
    pub async fn connect(&self) -> Result<(), ConnectorError> {
        let registered = self.http_register().await;
        self.shared.http_up.store(registered.is_ok(), Ordering::SeqCst);

        self.spawn_ws_loop();

        registered
    }

    /// The bus this connector falls back to.
    pub fn bus_handle(&self) -> &MessageBus<C> {
        &self.bus
    }

    /// Union of the WebSocket and HTTP connection states.
    pub fn is_connected(&self) -> bool {
        self.shared.ws_up.load(Ordering::SeqCst) || self.shared.http_up.load(Ordering::SeqCst)
    }

    /// Cooperative teardown: cancel reconnects, close the socket, clear
    /// connection state. In-flight HTTP calls run to their own timeouts.
    pub async fn disconnect(&self) {
        let _ = self.disconnect_tx.send(true);
        *self.shared.ws_out.lock() = None;
        self.shared.ws_up.store(false, Ordering::SeqCst);
        self.shared.http_up.store(false, Ordering::SeqCst);
    }

    /// Send one frame: WebSocket, else the HTTP endpoint for its type,
    /// else a bus broadcast.
    pub async fn send(&self, frame: &AgentFrame) -> Result<(), ConnectorError> {
        if self.shared.ws_up.load(Ordering::SeqCst) {
            let out = self.shared.ws_out.lock().clone();
            if let Some(out) = out {
                let line = serde_json::to_string(frame)?;
                if out.send(line).await.is_ok() {
                    return Ok(());
                }
            }
        }

        match self.send_http(frame).await {
            Ok(()) => {
                self.shared.http_up.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(error = %e, frame = frame.name(), "http send failed, bus fallback");
                self.shared.http_up.store(false, Ordering::SeqCst);
                self.send_via_bus(frame)?;
                Ok(())
            }
        }
    }

    /// Drain pending hub-side messages over HTTP (`GET /api/messages/...`).
    pub async fn poll_messages(&self) -> Result<Vec<BusMessage>, ConnectorError> {
        let path = format!("/api/messages/{}", self.config.session_id);
        let response = http::http_get(&self.config.hub_addr, &path).await?;
        if !response.is_success() {
            return Err(ConnectorError::Unreachable);
        }
        Ok(serde_json::from_str(&response.body)?)
    }

    async fn http_register(&self) -> Result<(), ConnectorError> {
        let body = serde_json::json!({
            "sessionId": self.config.session_id,
            "role": self.config.role,
            "capabilities": self.config.capabilities,
        });
        let response =
            http::http_post(&self.config.hub_addr, "/api/register", &body.to_string()).await?;
        if !response.is_success() {
            return Err(ConnectorError::Unreachable);
        }
        Ok(())
    }

    async fn send_http(&self, frame: &AgentFrame) -> Result<(), ConnectorError> {
        let addr = &self.config.hub_addr;
        let response = match frame {
            AgentFrame::Register { session_id, role, capabilities } => {
                let body = serde_json::json!({
                    "sessionId": session_id,
                    "role": role,
                    "capabilities": capabilities,
                });
                http::http_post(addr, "/api/register", &body.to_string()).await?
            }
            AgentFrame::Heartbeat { session_id, pressure, claimed_task } => {
                let body = serde_json::json!({
                    "sessionId": session_id,
                    "pressure": pressure,
                    "claimedTask": claimed_task,
                });
                http::http_post(addr, "/api/heartbeat", &body.to_string()).await?
            }
            AgentFrame::TaskComplete { session_id, task_id, result } => {
                let body = serde_json::json!({
                    "sessionId": session_id,
                    "result": result,
                });
                let path = format!("/api/tasks/{task_id}/complete");
                http::http_post(addr, &path, &body.to_string()).await?
            }
            AgentFrame::AskPm { session_id, question, context } => {
                let body = serde_json::json!({
                    "sessionId": session_id,
                    "question": question,
                    "context": context,
                });
                let response = http::http_post_timeout(
                    addr,
                    "/api/ask-pm",
                    &body.to_string(),
                    ASK_PM_TIMEOUT,
                )
                .await?;
                // The long-poll body is the PM's answer; route it through
                // the normal handler path
                if response.is_success() {
                    if let Ok(frame) = serde_json::from_str::<PmFrame>(&response.body) {
                        let _ = self.handler_tx.send(frame).await;
                    }
                }
                response
            }
            AgentFrame::Checkpoint { .. } | AgentFrame::Request { .. } => {
                let body = serde_json::to_string(frame)?;
                http::http_post(addr, "/api/report", &body).await?
            }
        };
        if response.is_success() {
            Ok(())
        } else {
            Err(ConnectorError::Unreachable)
        }
    }

    /// Last-resort delivery: broadcast the frame on the file bus for the
    /// PM's bus scan to pick up.
    fn send_via_bus(&self, frame: &AgentFrame) -> Result<(), ConnectorError> {
        let msg = BusMessage::new(MessageType::Broadcast, self.config.session_id.as_str())
            .with_topic("hub_fallback")
            .with_payload(serde_json::to_value(frame)?);
        self.bus.send(msg)?;
        Ok(())
    }

    fn spawn_ws_loop(&self) {
        let config = self.config.clone();
        let bus = Arc::clone(&self.bus);
        let shared = Arc::clone(&self.shared);
        let handler_tx = self.handler_tx.clone();
        let mut disconnect_rx = self.disconnect_tx.subscribe();

        tokio::spawn(async move {
            let mut backoff = BACKOFF_START;
            loop {
                if *disconnect_rx.borrow() {
                    break;
                }

                let url = format!("ws://{}/api/connect", config.hub_addr);
                match tokio_tungstenite::connect_async(url.as_str()).await {
                    Ok((stream, _)) => {
                        backoff = BACKOFF_START;
                        shared.ws_up.store(true, Ordering::SeqCst);
                        tracing::info!(session_id = %config.session_id, "hub socket connected");

                        run_ws_session(
                            stream,
                            &config,
                            &bus,
                            &shared,
                            &handler_tx,
                            &mut disconnect_rx,
                        )
                        .await;

                        shared.ws_up.store(false, Ordering::SeqCst);
                        *shared.ws_out.lock() = None;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "hub socket connect failed");
                    }
                }

                if *disconnect_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = disconnect_rx.changed() => {}
                }
                backoff = (backoff * 2).min(BACKOFF_MAX);
            }
        });
    }
}

/// One connected socket session: register, reconcile the bus backlog, then
/// pump frames until close or disconnect.
async fn run_ws_session<C: Clock>(
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    config: &ConnectorConfig,
    bus: &MessageBus<C>,
    shared: &Shared,
    handler_tx: &mpsc::Sender<PmFrame>,
    disconnect_rx: &mut watch::Receiver<bool>,
) {
    let (mut sink, mut read) = stream.split();

    let register = AgentFrame::Register {
        session_id: config.session_id.clone(),
        role: config.role.clone(),
        capabilities: config.capabilities.clone(),
    };
    let line = match serde_json::to_string(&register) {
        Ok(line) => line,
        Err(_) => return,
    };
    if sink.send(Message::Text(line.into())).await.is_err() {
        return;
    }

    // Reconcile before live delivery: anything addressed to this session
    // while the socket was down is delivered exactly once, then acked.
    reconcile_bus(bus, config, handler_tx).await;

    let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
    *shared.ws_out.lock() = Some(out_tx);

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PmFrame>(&text) {
                            Ok(frame) => {
                                if handler_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "unparseable hub frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "hub socket error");
                        break;
                    }
                    _ => {} // Ping/Pong/Binary — ignore
                }
            }
            out = out_rx.recv() => {
                match out {
                    Some(line) => {
                        if sink.send(Message::Text(line.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = disconnect_rx.changed() => {
                if *disconnect_rx.borrow() {
                    // Normal closure
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }
}

/// Deliver bus messages that arrived while disconnected, then acknowledge
/// them so the next reconcile pass delivers zero.
async fn reconcile_bus<C: Clock>(
    bus: &MessageBus<C>,
    config: &ConnectorConfig,
    handler_tx: &mpsc::Sender<PmFrame>,
) {
    let filter = ReadFilter {
        types: Some(vec![
            MessageType::PmResponse,
            MessageType::Notify,
            MessageType::Broadcast,
            MessageType::Request,
            MessageType::TaskDelegate,
        ]),
        role: Some(config.role.clone()),
        agent_name: Some(config.agent_name.clone()),
        ..Default::default()
    };

    let result = match bus.read(config.session_id.as_str(), &filter) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "bus reconcile read failed");
            return;
        }
    };
    if result.messages.is_empty() {
        return;
    }

    tracing::info!(
        count = result.messages.len(),
        session_id = %config.session_id,
        "reconciling bus backlog"
    );
    let ids: Vec<String> = result.messages.iter().map(|m| m.id.to_string()).collect();
    for message in result.messages {
        let _ = handler_tx.send(PmFrame::Message { message }).await;
    }
    let mut cursor = result.cursor;
    if let Err(e) = bus.acknowledge(&mut cursor, &ids) {
        tracing::warn!(error = %e, "bus reconcile ack failed");
    }
}

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;
