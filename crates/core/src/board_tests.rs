// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn status_serde_round_trip() {
    let status = AgentStatus {
        session_id: SessionId::new("S-1"),
        agent_name: "ann".into(),
        role: "backend".into(),
        task_id: Some(TaskId::new("T-1")),
        step: Some("implement".into()),
        files_touched: vec!["src/lib.rs".into()],
        updated_at: "2026-02-01T00:00:00.000Z".into(),
    };
    let json = serde_json::to_string(&status).unwrap();
    let parsed: AgentStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, status);
}

#[test]
fn registry_entry_defaults() {
    let entry: AgentRegistryEntry =
        serde_json::from_str(r#"{"role": "frontend"}"#).unwrap();
    assert!(entry.capabilities.is_empty());
    assert!(entry.file_patterns.is_empty());
    assert!(entry.exclude_patterns.is_empty());
}
