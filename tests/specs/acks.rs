//! Every acked message either gets a response or a DLQ entry within
//! `retries × deadline_ms` of sweeps.

use crate::prelude::Repo;
use pilot_bus::{AckLedger, AckOutcome, ACK_MAX_RETRIES};
use pilot_core::message::{AckSpec, BusMessage, MessageType};

#[test]
fn unanswered_message_lands_in_dlq_within_bound() {
    let repo = Repo::new();
    let ledger = AckLedger::new(repo.bus.paths().clone());

    let deadline_ms = 1000u64;
    let msg = BusMessage::new(MessageType::Request, "pm")
        .to("S-silent")
        .with_ack(AckSpec::required(deadline_ms))
        .stamped(&repo.clock, 1);
    let id = msg.id.to_string();
    ledger.register(&msg, &repo.clock).unwrap();

    // Sweep once per deadline window; the terminal sweep must come within
    // retries × deadline + 1s
    let mut dead = false;
    let bound_ms = (ACK_MAX_RETRIES as u64 + 1) * deadline_ms + 1000;
    let mut elapsed = 0;
    while elapsed <= bound_ms {
        repo.clock.advance_ms(deadline_ms + 1);
        elapsed += deadline_ms + 1;
        for outcome in ledger.sweep(&repo.clock).unwrap() {
            if let AckOutcome::DeadLettered { letter } = outcome {
                assert_eq!(letter.message_id, id);
                dead = true;
            }
        }
        if dead {
            break;
        }
    }
    assert!(dead, "message never reached the DLQ inside the bound");
    assert!(ledger.load().unwrap().is_empty());
}

#[test]
fn response_settles_ack_before_timeout() {
    let repo = Repo::new();
    let ledger = AckLedger::new(repo.bus.paths().clone());

    let msg = BusMessage::new(MessageType::Request, "pm")
        .to("S-2")
        .with_ack(AckSpec::required(5000))
        .stamped(&repo.clock, 1);
    ledger.register(&msg, &repo.clock).unwrap();

    // The response's correlation_id references the original message id
    repo.bus
        .send(
            BusMessage::new(MessageType::Response, "S-2")
                .to("pm")
                .with_correlation(msg.id.as_str()),
        )
        .unwrap();
    ledger.settle(msg.id.as_str()).unwrap();

    repo.clock.advance_ms(10_000);
    assert!(ledger.sweep(&repo.clock).unwrap().is_empty());
    assert!(ledger.dead_letters().unwrap().is_empty());
}

#[test]
fn escalation_chain_is_walked_before_dlq() {
    let repo = Repo::new();
    let ledger = AckLedger::new(repo.bus.paths().clone());

    let msg = BusMessage::new(MessageType::Request, "S-1")
        .to("S-peer")
        .with_ack(AckSpec::required(500).with_chain(vec!["pm".into(), "human".into()]))
        .stamped(&repo.clock, 1);
    ledger.register(&msg, &repo.clock).unwrap();

    let mut targets = Vec::new();
    for _ in 0..20 {
        repo.clock.advance_ms(501);
        for outcome in ledger.sweep(&repo.clock).unwrap() {
            if let AckOutcome::Escalate { target, .. } = outcome {
                targets.push(target);
            }
        }
    }
    // peer retries exhausted → pm → human → DLQ
    assert_eq!(targets, vec!["pm".to_string(), "human".to_string()]);
    assert_eq!(ledger.dead_letters().unwrap().len(), 1);
}
