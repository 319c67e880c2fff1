//! Claim conflict and lease-expiry behavior: two sessions racing for one
//! task.

use crate::prelude::Repo;
use pilot_core::claim::ClaimOutcome;
use pilot_core::Clock;
use pilot_core::id::TaskId;
use pilot_core::session::DEFAULT_LEASE_MS;

#[test]
fn second_claimer_is_told_who_holds() {
    let repo = Repo::new();
    let registry = repo.registry();
    let a = repo.session("S-a", 201);
    let b = repo.session("S-b", 202);
    let task = TaskId::new("T-1");

    assert!(registry.claim_task(&a.session_id, &task).unwrap().success());
    match registry.claim_task(&b.session_id, &task).unwrap() {
        ClaimOutcome::AlreadyClaimed { by } => assert_eq!(by, a.session_id),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn expired_lease_hands_task_over_and_clears_old_claim() {
    let repo = Repo::new();
    let registry = repo.registry();
    let a = repo.session("S-a", 201);
    let b = repo.session("S-b", 202);
    let task = TaskId::new("T-1");

    registry.claim_task(&a.session_id, &task).unwrap();
    repo.clock.advance_ms(DEFAULT_LEASE_MS + 1);

    // B retries and wins
    assert!(registry.claim_task(&b.session_id, &task).unwrap().success());

    // A's record shows no live claim any more
    let a_record = registry.load(&a.session_id).unwrap().unwrap();
    assert!(a_record.live_claim(repo.clock.epoch_ms()).is_none());

    // The claim set across active sessions has no duplicates
    let holders: Vec<_> = registry
        .active_sessions()
        .into_iter()
        .filter_map(|s| s.live_claim(repo.clock.epoch_ms()))
        .filter(|c| c.task_id == task)
        .collect();
    assert_eq!(holders.len(), 1);
    assert_eq!(holders[0].session_id, b.session_id);
}

#[test]
fn parallel_claimants_with_independent_handles_get_one_winner() {
    let repo = Repo::new();
    let task = TaskId::new("T-hot");

    // One registry handle per claimant, like separate helper processes;
    // the claims lock is what serializes them
    let mut entries = Vec::new();
    for i in 0u32..6 {
        let session = repo.session(&format!("S-{i}"), 300 + i);
        entries.push((repo.registry(), session.session_id));
    }

    let wins = std::sync::atomic::AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for entry in &entries {
            let (wins, task) = (&wins, &task);
            scope.spawn(move || {
                let (registry, session_id) = entry;
                if registry.claim_task(session_id, task).unwrap().success() {
                    wins.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            });
        }
    });
    assert_eq!(wins.load(std::sync::atomic::Ordering::SeqCst), 1);

    let held: Vec<_> = repo
        .registry()
        .active_sessions()
        .into_iter()
        .filter_map(|s| s.live_claim(repo.clock.epoch_ms()))
        .filter(|c| c.task_id == task)
        .collect();
    assert_eq!(held.len(), 1);
}

#[test]
fn claim_set_never_duplicates_under_racing() {
    let repo = Repo::new();
    let registry = repo.registry();
    let task = TaskId::new("T-hot");
    let sessions: Vec<_> = (0u32..6)
        .map(|i| repo.session(&format!("S-{i}"), 300 + i))
        .collect();

    let wins = sessions
        .iter()
        .filter(|s| registry.claim_task(&s.session_id, &task).unwrap().success())
        .count();
    assert_eq!(wins, 1);

    let held: Vec<_> = registry
        .active_sessions()
        .into_iter()
        .filter_map(|s| s.live_claim(repo.clock.epoch_ms()).map(|c| c.task_id))
        .collect();
    assert_eq!(held.len(), 1);
}
