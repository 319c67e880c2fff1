// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn claimed_outcome_is_success() {
    let outcome = ClaimOutcome::Claimed {
        claim: TaskClaim {
            task_id: TaskId::new("T-1"),
            session_id: SessionId::new("S-1"),
            claimed_at: "2026-01-01T00:00:00.000Z".into(),
            lease_expires_at: "2026-01-01T00:30:00.000Z".into(),
        },
    };
    assert!(outcome.success());
}

#[test]
fn conflict_outcome_reports_holder() {
    let outcome = ClaimOutcome::AlreadyClaimed {
        by: SessionId::new("S-9"),
    };
    assert!(!outcome.success());
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["outcome"], "already_claimed");
    assert_eq!(json["by"], "S-9");
}
