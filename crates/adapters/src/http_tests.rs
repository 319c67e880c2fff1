// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// One-shot HTTP server returning a canned response.
async fn canned_server(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            // Drain the request head before answering
            let mut buf = [0u8; 4096];
            use tokio::io::AsyncReadExt;
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(response.as_bytes()).await;
        }
    });
    addr
}

#[tokio::test]
async fn get_parses_status_and_body() {
    let addr =
        canned_server("HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\n{\"ok\":true}").await;
    let response = http_get(&addr, "/api/status").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "{\"ok\":true}");
    assert!(response.is_success());
}

#[tokio::test]
async fn error_status_is_reported_not_erred() {
    let addr = canned_server("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").await;
    let response = http_get(&addr, "/nope").await.unwrap();
    assert_eq!(response.status, 404);
    assert!(!response.is_success());
}

#[tokio::test]
async fn missing_content_length_means_empty_body() {
    let addr = canned_server("HTTP/1.1 204 No Content\r\n\r\n").await;
    let response = http_get(&addr, "/x").await.unwrap();
    assert_eq!(response.status, 204);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn connect_refused_is_error() {
    // Port 1 is essentially never listening
    let err = http_get("127.0.0.1:1", "/x").await.unwrap_err();
    assert!(matches!(err, HttpError::Connect(_) | HttpError::Timeout));
}

#[tokio::test]
async fn post_round_trips_body() {
    let addr = canned_server("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
    let response = http_post(&addr, "/api/report", "{\"a\":1}").await.unwrap();
    assert_eq!(response.body, "ok");
}
