// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal HTTP/1.1 client over TCP.
//!
//! Sends one request per connection and reads the response with
//! Content-Length framing (does not depend on connection close for EOF).
//! This is all the hub protocol needs; there is no keep-alive.

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Default per-request timeout covering connect + write + read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,

    #[error("connect failed: {0}")]
    Connect(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Parsed response: status code and body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP GET with the default timeout.
pub async fn http_get(addr: &str, path: &str) -> Result<HttpResponse, HttpError> {
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    timed_request(addr, &request, DEFAULT_TIMEOUT).await
}

/// HTTP POST with a JSON body.
pub async fn http_post(addr: &str, path: &str, body: &str) -> Result<HttpResponse, HttpError> {
    http_post_timeout(addr, path, body, DEFAULT_TIMEOUT).await
}

/// HTTP POST with a caller-supplied timeout (long-poll endpoints).
pub async fn http_post_timeout(
    addr: &str,
    path: &str,
    body: &str,
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    timed_request(addr, &request, timeout).await
}

async fn timed_request(
    addr: &str,
    request: &str,
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    tokio::time::timeout(timeout, send_request(addr, request))
        .await
        .map_err(|_| HttpError::Timeout)?
}

async fn send_request(addr: &str, request: &str) -> Result<HttpResponse, HttpError> {
    let mut stream = TcpStream::connect(addr).await.map_err(HttpError::Connect)?;
    stream.write_all(request.as_bytes()).await?;

    let mut reader = BufReader::new(&mut stream);
    read_http_response(&mut reader).await
}

/// Read and parse an HTTP/1.1 response from a buffered stream.
pub async fn read_http_response<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<HttpResponse, HttpError> {
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    if status_line.is_empty() {
        return Err(HttpError::Malformed("empty response".into()));
    }

    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| HttpError::Malformed(format!("bad status line: {status_line:?}")))?;

    // Headers: only Content-Length matters (case-insensitive)
    let mut content_length: usize = 0;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(val) = lower.strip_prefix("content-length:") {
            content_length = val.trim().parse().unwrap_or(0);
        }
    }

    let body = if content_length > 0 {
        let mut buf = vec![0u8; content_length];
        reader.read_exact(&mut buf).await?;
        String::from_utf8_lossy(&buf).into_owned()
    } else {
        String::new()
    };

    Ok(HttpResponse { status, body })
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
