// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn run() -> OvernightRun {
    OvernightRun {
        run_id: RunId::new("R-1"),
        status: RunStatus::Active,
        task_ids: vec![TaskId::new("T-1"), TaskId::new("T-2"), TaskId::new("T-3")],
        tasks_completed: vec![TaskId::new("T-1")],
        tasks_failed: vec![],
        tasks_in_progress: vec![TaskId::new("T-2")],
        total_errors: 0,
        drain_requested: false,
        drain_requested_at: None,
        started_at: "2026-02-01T00:00:00.000Z".into(),
        completed_at: None,
        updated_at: "2026-02-01T00:00:00.000Z".into(),
    }
}

#[test]
fn remaining_excludes_all_buckets() {
    let run = run();
    let remaining = run.remaining();
    assert_eq!(remaining, vec![&TaskId::new("T-3")]);
}

#[test]
fn active_check() {
    let mut run = run();
    assert!(run.is_active());
    run.status = RunStatus::Completed;
    assert!(!run.is_active());
}
