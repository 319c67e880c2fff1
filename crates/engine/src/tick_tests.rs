// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pilot_adapters::{FakeProcessWorld, FakeTracker};
use pilot_bus::fsio::append_jsonl;
use pilot_bus::BusPaths;
use pilot_core::clock::FakeClock;
use pilot_core::id::ApprovalId;
use pilot_core::session::{iso_from_ms, DEFAULT_LEASE_MS};
use pilot_core::telegram::{InboundMessage, PendingApproval};
use pilot_policy::BudgetScope;

struct Fixture {
    _dir: tempfile::TempDir,
    engine: PmEngine<FakeClock, FakeProcessWorld>,
    clock: FakeClock,
    world: FakeProcessWorld,
    tracker: Arc<FakeTracker>,
}

fn fixture_with(policy: Policy, options: PmOptions) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let world = FakeProcessWorld::new(100, 50);
    let bus = Arc::new(MessageBus::new(
        BusPaths::under_repo(dir.path()),
        clock.clone(),
    ));
    let tracker = Arc::new(FakeTracker::default());
    let engine = PmEngine::new(
        dir.path(),
        policy,
        options,
        clock.clone(),
        world.clone(),
        bus,
        Arc::clone(&tracker) as Arc<dyn TaskTracker>,
    );
    Fixture {
        _dir: dir,
        engine,
        clock,
        world,
        tracker,
    }
}

fn fixture() -> Fixture {
    let policy = Policy::default();
    let mut options = PmOptions::from_policy(&policy);
    options.dry_run = true;
    fixture_with(policy, options)
}

fn ready_task(f: &Fixture, id: &str, priority: u32) {
    f.tracker.push(TrackerTask {
        id: TaskId::new(id),
        title: format!("implement {id}"),
        priority,
        complexity: "M".into(),
    });
}

fn active_session(f: &Fixture, sid: &str, pid: u32) -> SessionRecord {
    f.world.add(pid, 1);
    let record = SessionRecord::new(
        &f.clock,
        SessionId::new(sid),
        pid,
        1,
        format!("agent-{sid}"),
        "backend",
    );
    f.engine.registry.save(&record).unwrap();
    let lock = f.engine.registry.tree().lock_file(sid);
    std::fs::create_dir_all(lock.parent().unwrap()).unwrap();
    std::fs::write(lock, pid.to_string()).unwrap();
    record
}

#[tokio::test]
async fn tick_runs_every_scan() {
    let f = fixture();
    let report = f.engine.tick().await;
    assert_eq!(report.tick, 1);
    assert_eq!(report.scans.len(), 12);
    assert!(report.scans.iter().all(|s| s.ok), "{:?}", report.scans);

    let names: Vec<&str> = report.scans.iter().map(|s| s.scan).collect();
    assert_eq!(
        names,
        vec![
            "session",
            "task",
            "research",
            "spawn",
            "ack",
            "deescalation",
            "budget",
            "drift",
            "cost",
            "telegram",
            "overnight",
            "human_queue"
        ]
    );
}

#[tokio::test]
async fn dry_run_records_spawn_intents() {
    let f = fixture();
    ready_task(&f, "T-low", 1);
    ready_task(&f, "T-high", 9);

    f.engine.tick().await;
    let intents = f.engine.spawn_intents();
    assert_eq!(intents.len(), 2);
    // Highest priority picked first
    assert_eq!(intents[0], TaskId::new("T-high"));
}

#[tokio::test]
async fn spawn_skips_claimed_tasks() {
    let f = fixture();
    ready_task(&f, "T-1", 5);
    let session = active_session(&f, "S-1", 200);
    f.engine
        .registry
        .claim_task(&session.session_id, &TaskId::new("T-1"))
        .unwrap();

    f.engine.tick().await;
    assert!(f.engine.spawn_intents().is_empty());
}

#[tokio::test]
async fn spawn_respects_pause_marker() {
    let f = fixture();
    ready_task(&f, "T-1", 5);
    pilot_bus::fsio::atomic_write_json(
        &f.engine.state_tree().paused_file(),
        &serde_json::json!({"paused": true}),
    )
    .unwrap();

    let report = f.engine.tick().await;
    let spawn = report.scans.iter().find(|s| s.scan == "spawn").unwrap();
    assert_eq!(spawn.detail, "paused");
    assert!(f.engine.spawn_intents().is_empty());
}

#[tokio::test]
async fn session_scan_sweeps_dead_agents() {
    let f = fixture();
    let session = active_session(&f, "S-dead", 222);
    f.world.remove(222);

    f.engine.tick().await;
    let record = f.engine.registry.load(&session.session_id).unwrap().unwrap();
    assert!(!record.is_active());
}

#[tokio::test]
async fn budget_scan_escalates_exceeded_task() {
    let policy = Policy {
        budget: pilot_policy::BudgetPolicy {
            cost_per_million_tokens: 10.0,
            per_task: BudgetScope {
                warn_tokens: 1000,
                block_tokens: 2000,
            },
            per_agent_day: BudgetScope {
                warn_tokens: 1_000_000,
                block_tokens: 2_000_000,
            },
            per_day: BudgetScope {
                warn_tokens: 1_000_000,
                block_tokens: 2_000_000,
            },
        },
        ..Default::default()
    };
    let mut options = PmOptions::from_policy(&policy);
    options.dry_run = true;
    let f = fixture_with(policy, options);

    let session = active_session(&f, "S-1", 200);
    let task = TaskId::new("T-1");
    f.engine.registry.claim_task(&session.session_id, &task).unwrap();
    // 2100 tokens = 8400 bytes: past block_tokens
    f.engine.costs.record(&session.session_id, &task, 8400).unwrap();

    f.engine.tick().await;

    // budget_exceeded escalates; first level is warning
    let key = pilot_core::escalation::event_key(
        EscalationEvent::BudgetExceeded,
        &session.session_id,
        Some(&task),
    );
    let state = f.engine.escalator.load_state(&key).expect("escalation state");
    assert_eq!(state.level, pilot_core::escalation::EscalationLevel::Warning);

    // Past the 300s cooldown, the next tick advances to block and the
    // session's edits are refused. Keep the heartbeat fresh so the stale
    // sweep does not end the session first.
    f.clock.advance_secs(301);
    f.engine.registry.heartbeat(&session.session_id).unwrap();
    f.engine.tick().await;
    let state = f.engine.escalator.load_state(&key).unwrap();
    assert_eq!(state.level, pilot_core::escalation::EscalationLevel::Block);
    assert!(f.engine.escalator.is_agent_blocked(&session.session_id));
}

#[tokio::test]
async fn drift_check_triggers_escalation() {
    let policy = Policy::default();
    let mut options = PmOptions::from_policy(&policy);
    options.dry_run = true;
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let world = FakeProcessWorld::new(100, 50);
    let bus = Arc::new(MessageBus::new(
        BusPaths::under_repo(dir.path()),
        clock.clone(),
    ));
    let tracker = Arc::new(FakeTracker::default());
    let engine = PmEngine::new(
        dir.path(),
        policy,
        options,
        clock.clone(),
        world.clone(),
        bus,
        tracker as Arc<dyn TaskTracker>,
    )
    .with_drift_check(Box::new(|record| {
        (record.session_id.as_str() == "S-drifter").then(|| "editing unplanned files".to_string())
    }));

    world.add(200, 1);
    let record = SessionRecord::new(&clock, SessionId::new("S-drifter"), 200, 1, "ann", "backend");
    engine.registry.save(&record).unwrap();
    let lock = engine.registry.tree().lock_file("S-drifter");
    std::fs::create_dir_all(lock.parent().unwrap()).unwrap();
    std::fs::write(lock, "200").unwrap();

    engine.tick().await;
    let key = pilot_core::escalation::event_key(
        EscalationEvent::Drift,
        &SessionId::new("S-drifter"),
        None,
    );
    assert!(engine.escalator.load_state(&key).is_some());
}

#[tokio::test]
async fn telegram_approval_timeout_escalates_and_notifies() {
    let f = fixture();
    let session = active_session(&f, "S-1", 200);
    let task = TaskId::new("T-1");

    // An escalation awaiting human approval
    f.engine
        .escalator
        .trigger(EscalationEvent::MergeConflict, &session.session_id, Some(&task), "conflict")
        .unwrap();

    f.engine
        .telegram
        .register_approval(PendingApproval {
            approval_id: ApprovalId::new("A-1"),
            task_id: task.clone(),
            kind: "escalation".into(),
            session_id: session.session_id.clone(),
            chat_id: 42,
            expires_at: iso_from_ms(f.clock.epoch_ms() + 3_600_000),
            escalated: false,
        })
        .unwrap();

    // 61 minutes later the approval expires: one level advance + notice
    f.clock.advance_ms(3_600_000 + 60_000);
    f.engine.tick().await;

    let key = pilot_core::escalation::event_key(
        EscalationEvent::MergeConflict,
        &session.session_id,
        Some(&task),
    );
    let state = f.engine.escalator.load_state(&key).unwrap();
    assert_eq!(state.level_index, 1, "advanced exactly one level");

    let outbox: Vec<pilot_core::telegram::OutboundMessage> = pilot_bus::fsio::read_jsonl(
        &f.engine.state_tree().telegram_outbox_file(),
    )
    .unwrap();
    let notice = outbox.last().unwrap();
    assert_eq!(notice.text, "Approval timeout: T-1. Auto-escalated.");
    assert_eq!(notice.chat_id, 42);
}

#[tokio::test]
async fn telegram_status_command_replies() {
    let f = fixture();
    active_session(&f, "S-1", 200);
    append_jsonl(
        &f.engine.state_tree().telegram_inbox_file(),
        &InboundMessage {
            chat_id: 42,
            text: "status".into(),
            ts: "2026-02-01T00:00:00.000Z".into(),
        },
    )
    .unwrap();

    f.engine.tick().await;

    let outbox: Vec<pilot_core::telegram::OutboundMessage> = pilot_bus::fsio::read_jsonl(
        &f.engine.state_tree().telegram_outbox_file(),
    )
    .unwrap();
    assert!(outbox[0].text.contains("1 active agents"));
}

#[tokio::test]
async fn overnight_drain_timeout_completes_run() {
    let f = fixture();
    let mut run = f.engine.overnight.plan_and_queue(vec![TaskId::new("T-1")]).unwrap();
    f.engine.overnight.request_drain(&mut run).unwrap();

    f.clock.advance_ms(15 * 60_000 + 1);
    f.engine.tick().await;

    assert!(f.engine.overnight.active_run().is_none());
    let report_path = f
        .engine
        .state_tree()
        .overnight_report_file(run.run_id.as_str());
    assert!(report_path.exists());
}

#[tokio::test]
async fn scan_failure_does_not_stop_tick() {
    let f = fixture();
    // Sabotage the telegram cursor with a directory so the scan errors
    let cursor_path = f.engine.state_tree().telegram_cursor_file();
    std::fs::create_dir_all(&cursor_path).unwrap();
    // Inbox must exist for poll to reach the cursor write
    append_jsonl(
        &f.engine.state_tree().telegram_inbox_file(),
        &InboundMessage {
            chat_id: 1,
            text: "status".into(),
            ts: "2026-02-01T00:00:00.000Z".into(),
        },
    )
    .unwrap();

    let report = f.engine.tick().await;
    assert_eq!(report.scans.len(), 12);
    let telegram = report.scans.iter().find(|s| s.scan == "telegram").unwrap();
    assert!(!telegram.ok);
    // Later scans still ran
    assert!(report.scans.iter().any(|s| s.scan == "human_queue"));
}

#[tokio::test]
async fn claim_lease_expiry_frees_task_for_spawn() {
    let f = fixture();
    ready_task(&f, "T-1", 5);
    let session = active_session(&f, "S-1", 200);
    f.engine
        .registry
        .claim_task(&session.session_id, &TaskId::new("T-1"))
        .unwrap();

    f.engine.tick().await;
    assert!(f.engine.spawn_intents().is_empty());

    // Lease expires; heartbeat kept fresh so the session survives sweep
    f.clock.advance_ms(DEFAULT_LEASE_MS / 2);
    f.engine.registry.heartbeat(&session.session_id).unwrap();
    f.clock.advance_ms(DEFAULT_LEASE_MS / 2 + 1);
    f.engine.registry.heartbeat(&session.session_id).unwrap();

    f.engine.tick().await;
    assert_eq!(f.engine.spawn_intents(), vec![TaskId::new("T-1")]);
}
