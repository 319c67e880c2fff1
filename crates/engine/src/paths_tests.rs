// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn tree_layout_is_repo_relative() {
    let tree = StateTree::under_repo(Path::new("/repo"));
    assert_eq!(
        tree.session_file("S-1"),
        PathBuf::from("/repo/state/sessions/S-1.json")
    );
    assert_eq!(tree.lock_file("S-1"), PathBuf::from("/repo/state/locks/S-1.lock"));
    assert_eq!(
        tree.hub_file(),
        PathBuf::from("/repo/state/orchestrator/pm-hub.json")
    );
    assert_eq!(
        tree.daemon_pid_file(),
        PathBuf::from("/repo/state/orchestrator/pm-daemon.pid")
    );
    assert_eq!(
        tree.escalation_file("drift_S-1_T-1"),
        PathBuf::from("/repo/state/escalations/drift_S-1_T-1.json")
    );
    assert_eq!(
        tree.block_marker_file("S-1"),
        PathBuf::from("/repo/state/escalations/block_S-1")
    );
    assert_eq!(
        tree.task_cost_file("T-1"),
        PathBuf::from("/repo/state/costs/tasks/T-1.json")
    );
    assert_eq!(
        tree.review_gate_file("T-1"),
        PathBuf::from("/repo/state/review-gates/T-1.json")
    );
    assert_eq!(
        tree.pattern_library_file(),
        PathBuf::from("/repo/state/decomposition-patterns/library.json")
    );
    assert_eq!(
        tree.overnight_error_file("T-2"),
        PathBuf::from("/repo/state/overnight/errors/T-2.json")
    );
}
