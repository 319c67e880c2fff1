// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pilot_bus::BusPaths;
use pilot_core::clock::FakeClock;
use pilot_core::wire::AgentFrame;
use serial_test::serial;

fn setup(hub_addr: &str) -> (tempfile::TempDir, AgentConnector<FakeClock>, tokio::sync::mpsc::Receiver<PmFrame>) {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MessageBus::new(
        BusPaths::new(dir.path().join("messages")),
        FakeClock::new(),
    ));
    let config = ConnectorConfig {
        session_id: SessionId::new("S-1"),
        role: "backend".into(),
        agent_name: "ann".into(),
        capabilities: vec!["rust".into()],
        hub_addr: hub_addr.to_string(),
    };
    let (connector, rx) = AgentConnector::new(config, bus);
    (dir, connector, rx)
}

#[test]
fn discovery_prefers_hub_file() {
    let dir = tempfile::tempdir().unwrap();
    let hub_dir = dir.path().join("state/orchestrator");
    std::fs::create_dir_all(&hub_dir).unwrap();
    std::fs::write(hub_dir.join("pm-hub.json"), r#"{"port": 4001}"#).unwrap();

    assert_eq!(discover_hub_port(dir.path()), 4001);
}

#[test]
#[serial]
fn discovery_falls_back_to_env_then_default() {
    let dir = tempfile::tempdir().unwrap();

    std::env::set_var("PILOT_PM_PORT", "4002");
    assert_eq!(discover_hub_port(dir.path()), 4002);

    std::env::remove_var("PILOT_PM_PORT");
    assert_eq!(discover_hub_port(dir.path()), DEFAULT_HUB_PORT);
}

#[test]
fn discovery_ignores_corrupt_hub_file() {
    let dir = tempfile::tempdir().unwrap();
    let hub_dir = dir.path().join("state/orchestrator");
    std::fs::create_dir_all(&hub_dir).unwrap();
    std::fs::write(hub_dir.join("pm-hub.json"), "not json").unwrap();

    assert_eq!(discover_hub_port(dir.path()), DEFAULT_HUB_PORT);
}

#[tokio::test]
async fn starts_disconnected() {
    let (_dir, connector, _rx) = setup("127.0.0.1:1");
    assert!(!connector.is_connected());
}

#[tokio::test]
async fn send_falls_back_to_bus_when_hub_unreachable() {
    let (_dir, connector, _rx) = setup("127.0.0.1:1");

    let frame = AgentFrame::Heartbeat {
        session_id: SessionId::new("S-1"),
        pressure: Some(0.3),
        claimed_task: None,
    };
    connector.send(&frame).await.unwrap();

    // The frame landed on the bus as a broadcast from this session
    let result = connector
        .bus_handle()
        .read("pm", &ReadFilter::default())
        .unwrap();
    assert_eq!(result.messages.len(), 1);
    assert_eq!(result.messages[0].from, "S-1");
    assert_eq!(result.messages[0].topic.as_deref(), Some("hub_fallback"));
    let payload: AgentFrame =
        serde_json::from_value(result.messages[0].payload.clone()).unwrap();
    assert_eq!(payload, frame);
}

#[tokio::test]
async fn disconnect_clears_state() {
    let (_dir, connector, _rx) = setup("127.0.0.1:1");
    let _ = connector.connect().await;
    connector.disconnect().await;
    assert!(!connector.is_connected());
    // Idempotent
    connector.disconnect().await;
}
