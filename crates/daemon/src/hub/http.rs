// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hand-rolled HTTP/1.1 handling for the hub.
//!
//! One request per connection, Content-Length framing both directions.
//! `GET /api/connect` with an upgrade header hands the stream to the
//! WebSocket half.

use super::{ws, HubState, ASK_PM_TIMEOUT_SECS};
use pilot_adapters::ProcessWorld;
use pilot_bus::ReadFilter;
use pilot_core::clock::Clock;
use pilot_core::id::{MessageId, SessionId};
use pilot_core::message::{BusMessage, MessageType};
use pilot_core::wire::AgentFrame;
use pilot_engine::PM_SENDER;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Ceiling on request bodies; the hub never needs more.
const MAX_BODY: usize = 64 * 1024;

/// Parsed request head.
pub(super) struct RequestHead {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn is_ws_upgrade(&self) -> bool {
        self.header("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
    }
}

pub(super) async fn handle_connection<C: Clock, P: ProcessWorld>(
    stream: TcpStream,
    state: Arc<HubState<C, P>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let head = match read_head(&mut reader).await? {
        Some(head) => head,
        None => return Ok(()),
    };

    if head.path == "/api/connect" && head.is_ws_upgrade() {
        let key = head.header("sec-websocket-key").unwrap_or_default().to_string();
        return ws::serve(reader.into_inner(), key, state).await;
    }

    let body = read_body(&mut reader, &head).await?;
    let (status, reply) = route(&head, &body, &state).await;
    write_response(reader.get_mut(), status, &reply).await
}

async fn read_head(
    reader: &mut BufReader<TcpStream>,
) -> std::io::Result<Option<RequestHead>> {
    use tokio::io::AsyncBufReadExt;

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(None);
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    Ok(Some(RequestHead {
        method,
        path,
        headers,
    }))
}

async fn read_body(
    reader: &mut BufReader<TcpStream>,
    head: &RequestHead,
) -> std::io::Result<String> {
    let length: usize = head
        .header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if length == 0 {
        return Ok(String::new());
    }
    if length > MAX_BODY {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "body too large",
        ));
    }
    let mut buf = vec![0u8; length];
    reader.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    body: &str,
) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        504 => "Gateway Timeout",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}

fn bad_request(error: impl std::fmt::Display) -> (u16, String) {
    (400, serde_json::json!({ "error": error.to_string() }).to_string())
}

async fn route<C: Clock, P: ProcessWorld>(
    head: &RequestHead,
    body: &str,
    state: &Arc<HubState<C, P>>,
) -> (u16, String) {
    match (head.method.as_str(), head.path.as_str()) {
        ("POST", "/api/register") => {
            let frame = match parse_register(body) {
                Ok(frame) => frame,
                Err(e) => return bad_request(e),
            };
            state.handle_frame(&frame, None);
            (200, serde_json::json!({ "connected": true }).to_string())
        }
        ("POST", "/api/heartbeat") => {
            let frame = match parse_heartbeat(body) {
                Ok(frame) => frame,
                Err(e) => return bad_request(e),
            };
            state.handle_frame(&frame, None);
            (200, serde_json::json!({ "ok": true }).to_string())
        }
        ("POST", path) if path.starts_with("/api/tasks/") && path.ends_with("/complete") => {
            let task_id = path
                .trim_start_matches("/api/tasks/")
                .trim_end_matches("/complete");
            let frame = match parse_complete(body, task_id) {
                Ok(frame) => frame,
                Err(e) => return bad_request(e),
            };
            state.handle_frame(&frame, None);
            (200, serde_json::json!({ "ok": true }).to_string())
        }
        ("POST", "/api/ask-pm") => ask_pm(body, state).await,
        ("POST", "/api/report") => match AgentFrame::parse(body) {
            Ok(frame) => {
                state.handle_frame(&frame, None);
                (200, serde_json::json!({ "ok": true }).to_string())
            }
            Err(e) => bad_request(e),
        },
        ("GET", path) if path.starts_with("/api/messages/") => {
            let session_id = path.trim_start_matches("/api/messages/");
            pending_messages(session_id, state)
        }
        ("GET", "/api/status") => {
            let engine = &state.engine;
            (
                200,
                serde_json::json!({
                    "ok": true,
                    "connected_agents": state.connected_agents(),
                    "ticks": engine.ticks_run(),
                    "active_sessions": engine.registry.active_sessions().len(),
                })
                .to_string(),
            )
        }
        _ => (404, serde_json::json!({ "error": "not found" }).to_string()),
    }
}

/// Long-poll: park the question, answer arrives via `HubState::answer`, or
/// time out at the 130 s ceiling.
async fn ask_pm<C: Clock, P: ProcessWorld>(
    body: &str,
    state: &Arc<HubState<C, P>>,
) -> (u16, String) {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => return bad_request(e),
    };
    let session_id = SessionId::new(value["sessionId"].as_str().unwrap_or_default());
    let question = value["question"].as_str().unwrap_or_default().to_string();
    let context = value["context"].clone();
    let frame = AgentFrame::AskPm {
        session_id: session_id.clone(),
        question: question.clone(),
        context: context.clone(),
    };
    if let Err(e) = frame.validate() {
        return bad_request(e);
    }

    let correlation_id = MessageId::generate(&state.clock).to_string();
    let waiter = state.park_answer(correlation_id.clone());

    let _ = state.engine.bus().send(
        BusMessage::new(MessageType::Query, session_id.as_str())
            .to(PM_SENDER)
            .with_topic("ask_pm")
            .with_correlation(correlation_id.clone())
            .with_payload(serde_json::json!({
                "question": question,
                "context": context,
            })),
    );

    match tokio::time::timeout(Duration::from_secs(ASK_PM_TIMEOUT_SECS), waiter).await {
        Ok(Ok(answer)) => (
            200,
            serde_json::to_string(&answer).unwrap_or_else(|_| "{}".to_string()),
        ),
        _ => {
            state.drop_answer(&correlation_id);
            (504, serde_json::json!({ "error": "timeout" }).to_string())
        }
    }
}

fn pending_messages<C: Clock, P: ProcessWorld>(
    session_id: &str,
    state: &Arc<HubState<C, P>>,
) -> (u16, String) {
    let bus = state.engine.bus();
    match bus.read(session_id, &ReadFilter::default()) {
        Ok(result) => {
            let ids: Vec<String> = result.messages.iter().map(|m| m.id.to_string()).collect();
            let body = serde_json::to_string(&result.messages)
                .unwrap_or_else(|_| "[]".to_string());
            let mut cursor = result.cursor;
            if let Err(e) = bus.acknowledge(&mut cursor, &ids) {
                tracing::warn!(session_id, error = %e, "message poll ack failed");
            }
            (200, body)
        }
        Err(e) => bad_request(e),
    }
}

fn parse_register(body: &str) -> Result<AgentFrame, String> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let frame = AgentFrame::Register {
        session_id: SessionId::new(value["sessionId"].as_str().unwrap_or_default()),
        role: value["role"].as_str().unwrap_or_default().to_string(),
        capabilities: value["capabilities"]
            .as_array()
            .map(|caps| {
                caps.iter()
                    .filter_map(|c| c.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default(),
    };
    frame.validate().map_err(|e| e.to_string())?;
    Ok(frame)
}

fn parse_heartbeat(body: &str) -> Result<AgentFrame, String> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let frame = AgentFrame::Heartbeat {
        session_id: SessionId::new(value["sessionId"].as_str().unwrap_or_default()),
        pressure: value["pressure"].as_f64(),
        claimed_task: value["claimedTask"]
            .as_str()
            .map(pilot_core::id::TaskId::new),
    };
    frame.validate().map_err(|e| e.to_string())?;
    Ok(frame)
}

fn parse_complete(body: &str, task_id: &str) -> Result<AgentFrame, String> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let frame = AgentFrame::TaskComplete {
        session_id: SessionId::new(value["sessionId"].as_str().unwrap_or_default()),
        task_id: pilot_core::id::TaskId::new(task_id),
        result: value["result"].clone(),
    };
    frame.validate().map_err(|e| e.to_string())?;
    Ok(frame)
}
