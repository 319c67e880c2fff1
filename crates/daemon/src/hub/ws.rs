// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket half of the hub.
//!
//! The HTTP layer has already consumed the upgrade request head, so the
//! handshake response is written by hand and the raw stream is wrapped as
//! a server-side socket. First frame must be `register`; invalid frames
//! get an `error` reply instead of a dropped connection.

use super::HubState;
use futures_util::{SinkExt, StreamExt};
use pilot_adapters::ProcessWorld;
use pilot_core::clock::Clock;
use pilot_core::id::SessionId;
use pilot_core::wire::{AgentFrame, PmFrame};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub(super) async fn serve<C: Clock, P: ProcessWorld>(
    mut stream: TcpStream,
    key: String,
    state: Arc<HubState<C, P>>,
) -> std::io::Result<()> {
    if key.is_empty() {
        let _ = stream
            .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
            .await;
        return Ok(());
    }

    let accept = derive_accept_key(key.as_bytes());
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    stream.write_all(response.as_bytes()).await?;

    let ws = WebSocketStream::from_raw_socket(stream, Role::Server, None).await;
    let (mut sink, mut read) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<PmFrame>(32);

    let mut session_id: Option<SessionId> = None;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match AgentFrame::parse(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                let reply = PmFrame::Error { error: e.to_string() };
                                if send_frame(&mut sink, &reply).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        if session_id.is_none() {
                            // First frame must register the socket
                            if !matches!(frame, AgentFrame::Register { .. }) {
                                let reply = PmFrame::Error {
                                    error: "register first".to_string(),
                                };
                                if send_frame(&mut sink, &reply).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                            session_id = Some(frame.session_id().clone());
                        }
                        let reply = state.handle_frame(&frame, Some(out_tx.clone()));
                        if let Some(reply) = reply {
                            if send_frame(&mut sink, &reply).await.is_err() {
                                break;
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
                    Some(frame) => {
                        if send_frame(&mut sink, &frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(session_id) = session_id {
        state.unregister_ws(&session_id);
        tracing::info!(session_id = %session_id, "agent socket closed");
    }
    Ok(())
}

async fn send_frame<S>(sink: &mut S, frame: &PmFrame) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let Ok(line) = serde_json::to_string(frame) else {
        return Err(());
    };
    sink.send(Message::Text(line.into())).await.map_err(|_| ())
}
