//! Drift escalation full path through the PM tick: warning → block (edits
//! refused) → reassign (claim released) → human (queued), then pinned.

use crate::prelude::Repo;
use pilot_core::escalation::{event_key, EscalationEvent, EscalationLevel};
use pilot_core::id::TaskId;
use pilot_policy::Policy;

#[tokio::test]
async fn drift_escalates_level_by_level() {
    let repo = Repo::new();
    let engine = repo
        .engine(Policy::default())
        .with_drift_check(Box::new(|record| {
            (record.session_id.as_str() == "S-1").then(|| "working off-plan".to_string())
        }));

    let session = repo.session("S-1", 201);
    let task = TaskId::new("T-1");
    engine.registry.claim_task(&session.session_id, &task).unwrap();
    let key = event_key(EscalationEvent::Drift, &session.session_id, Some(&task));

    // Tick 1: warning
    engine.tick().await;
    let state = engine.escalator.load_state(&key).expect("drift raised");
    assert_eq!(state.level, EscalationLevel::Warning);
    assert!(!engine.escalator.is_agent_blocked(&session.session_id));

    // Past the 120s cooldown: block, with marker
    repo.clock.advance_secs(200);
    engine.registry.heartbeat(&session.session_id).unwrap();
    engine.tick().await;
    assert_eq!(
        engine.escalator.load_state(&key).unwrap().level,
        EscalationLevel::Block
    );
    assert!(engine.escalator.is_agent_blocked(&session.session_id));

    // Reassign: marker removed, claim released
    repo.clock.advance_secs(200);
    engine.registry.heartbeat(&session.session_id).unwrap();
    engine.tick().await;
    assert_eq!(
        engine.escalator.load_state(&key).unwrap().level,
        EscalationLevel::Reassign
    );
    assert!(!engine.escalator.is_agent_blocked(&session.session_id));
    let record = engine.registry.load(&session.session_id).unwrap().unwrap();
    assert!(record.claimed_task.is_none(), "claim released on reassign");

    // Human: queue appended. The recovery pathway handed the task back to
    // the same (still-drifting) session, so the event keeps its key.
    engine.registry.claim_task(&session.session_id, &task).unwrap();
    repo.clock.advance_secs(200);
    engine.registry.heartbeat(&session.session_id).unwrap();
    engine.tick().await;
    assert_eq!(
        engine.escalator.load_state(&key).unwrap().level,
        EscalationLevel::Human
    );
    assert_eq!(engine.escalator.human_queue().len(), 1);

    // Further triggers stay pinned
    repo.clock.advance_secs(200);
    engine.registry.heartbeat(&session.session_id).unwrap();
    engine.tick().await;
    let state = engine.escalator.load_state(&key).unwrap();
    assert_eq!(state.level, EscalationLevel::Human);
    assert!(state.retries >= 1);
}
