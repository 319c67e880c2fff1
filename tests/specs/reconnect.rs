//! Reconnect reconciliation: a `pm_response` written while the agent was
//! offline is delivered exactly once when the socket comes back.

use crate::prelude::Repo;
use pilot_adapters::{AgentConnector, ConnectorConfig};
use pilot_core::clock::FakeClock;
use pilot_core::id::SessionId;
use pilot_core::message::{BusMessage, MessageType};
use pilot_core::wire::PmFrame;
use pilot_daemon::hub::{Hub, HubState};
use pilot_engine::PM_SENDER;
use pilot_policy::Policy;
use std::sync::Arc;
use std::time::Duration;

fn connector_config(repo: &Repo, addr: &str) -> ConnectorConfig {
    ConnectorConfig {
        session_id: SessionId::new("S-A"),
        role: "backend".into(),
        agent_name: "ann".into(),
        capabilities: vec!["rust".into()],
        hub_addr: addr.to_string(),
    }
}

#[tokio::test]
async fn offline_pm_response_is_delivered_exactly_once() {
    let repo = Repo::new();
    let engine = Arc::new(repo.engine(Policy::default()));
    let state: Arc<HubState<FakeClock, _>> =
        HubState::new(Arc::clone(&engine), repo.clock.clone());
    let hub = Hub::start(Arc::clone(&state), 0).await.unwrap();
    let addr = format!("127.0.0.1:{}", hub.port());

    // While S-A is offline, the PM answers an earlier question
    repo.bus
        .send(
            BusMessage::new(MessageType::PmResponse, PM_SENDER)
                .to("S-A")
                .with_correlation("C-1")
                .with_payload(serde_json::json!({"answer": "proceed"})),
        )
        .unwrap();

    // S-A reconnects: the reconcile pass runs before live delivery
    let (connector, mut rx) = AgentConnector::new(connector_config(&repo, &addr), Arc::clone(&repo.bus));
    connector.connect().await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("reconciled within deadline")
        .expect("handler open");
    match frame {
        PmFrame::Message { message } => {
            assert_eq!(message.kind, MessageType::PmResponse);
            assert_eq!(message.correlation_id.as_deref(), Some("C-1"));
        }
        other => panic!("expected reconciled pm_response, got {other:?}"),
    }

    // No duplicate delivery afterwards; the socket's own welcome frame is
    // the only thing still in flight
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
        assert!(
            !matches!(frame, PmFrame::Message { .. }),
            "second delivery observed: {frame:?}"
        );
    }

    // A fresh reconnect reconciles zero: the first pass acknowledged
    connector.disconnect().await;
    let (connector2, mut rx2) =
        AgentConnector::new(connector_config(&repo, &addr), Arc::clone(&repo.bus));
    connector2.connect().await.unwrap();
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(1), rx2.recv()).await {
        assert!(
            !matches!(frame, PmFrame::Message { .. }),
            "reconcile pass after ack delivered: {frame:?}"
        );
    }

    connector2.disconnect().await;
    hub.stop(&state);
}

#[tokio::test]
async fn connector_reports_connected_after_register() {
    let repo = Repo::new();
    let engine = Arc::new(repo.engine(Policy::default()));
    let state = HubState::new(Arc::clone(&engine), repo.clock.clone());
    let hub = Hub::start(Arc::clone(&state), 0).await.unwrap();
    let addr = format!("127.0.0.1:{}", hub.port());

    let (connector, _rx) = AgentConnector::new(connector_config(&repo, &addr), Arc::clone(&repo.bus));
    connector.connect().await.unwrap();
    assert!(connector.is_connected());

    connector.disconnect().await;
    assert!(!connector.is_connected());
    hub.stop(&state);
}
