//! Budget block end-to-end: warn at 1000 tokens, block at 2000, edits
//! refused.

use crate::prelude::Repo;
use pilot_bus::ReadFilter;
use pilot_core::cost::BudgetStatus;
use pilot_core::escalation::{event_key, EscalationEvent, EscalationLevel};
use pilot_core::id::TaskId;
use pilot_policy::{BudgetScope, Policy};

fn tight_policy() -> Policy {
    let mut policy = Policy::default();
    policy.budget.per_task = BudgetScope {
        warn_tokens: 1000,
        block_tokens: 2000,
    };
    policy
}

#[tokio::test]
async fn budget_walks_ok_warning_block() {
    let repo = Repo::new();
    let engine = repo.engine(tight_policy());
    let session = repo.session("S-1", 201);
    let task = TaskId::new("T-1");
    engine.registry.claim_task(&session.session_id, &task).unwrap();

    // 800 tokens -> ok
    engine.costs.record(&session.session_id, &task, 3200).unwrap();
    assert_eq!(engine.costs.check(&session.session_id, &task), BudgetStatus::Ok);

    // +300 -> warning; the tick notifies the agent
    engine.costs.record(&session.session_id, &task, 1200).unwrap();
    engine.tick().await;
    let inbox = repo.bus.read("S-1", &ReadFilter::default()).unwrap();
    assert!(inbox
        .messages
        .iter()
        .any(|m| m.topic.as_deref() == Some("budget.warning")));

    // +1000 -> exceeded; escalation starts at warning
    engine.costs.record(&session.session_id, &task, 4000).unwrap();
    engine.registry.heartbeat(&session.session_id).unwrap();
    engine.tick().await;

    let key = event_key(EscalationEvent::BudgetExceeded, &session.session_id, Some(&task));
    let state = engine.escalator.load_state(&key).expect("escalation raised");
    assert_eq!(state.level, EscalationLevel::Warning);

    // After the 300s cooldown the escalation advances to block and the
    // pre-tool-use check refuses edits for that session
    repo.clock.advance_secs(301);
    engine.registry.heartbeat(&session.session_id).unwrap();
    engine.tick().await;

    let state = engine.escalator.load_state(&key).unwrap();
    assert_eq!(state.level, EscalationLevel::Block);
    assert!(engine.escalator.is_agent_blocked(&session.session_id));
    let marker = engine.escalator.block_marker(&session.session_id).unwrap();
    assert_eq!(marker.task_id, Some(task));
}
