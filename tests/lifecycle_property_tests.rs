//! Property-based tests for the e-document lifecycle
//!
//! The transition rule is the one invariant every stored record depends on: a
//! status may repeat but never regress. These tests drive random sequences of
//! transitions through a real sled ledger and check the rule, the history
//! that results from it, and the key scheme that keeps records apart.
//!
//! What these tests DON'T cover (deliberately):
//!
//! - Persistence across reopen (covered by the scenarios)
//! - The contract's argument parsing (covered by the smoke tests)

use edoc_ledger::{EDocService, EdocError, SledLedger, Status, Submission, store::compute_key};
use proptest::prelude::*;
use std::sync::Arc;

fn service() -> EDocService<SledLedger> {
    EDocService::new(Arc::new(SledLedger::temporary().unwrap()))
}

fn status_strategy() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Modified),
        Just(Status::Archived),
        Just(Status::Deleted),
    ]
}

fn any_status() -> impl Strategy<Value = Status> {
    prop::sample::select(Status::ALL.to_vec())
}

/// Key components drawn from a small alphabet so concatenations collide often
fn component_strategy() -> impl Strategy<Value = String> {
    "[ab]{1,4}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// A transition succeeds iff the target does not rank below the current status
    #[test]
    fn transition_succeeds_iff_rank_does_not_drop(
        targets in prop::collection::vec(status_strategy(), 1..=8),
    ) {
        let service = service();
        service
            .create(Submission::new("SAP", "INV-1", "alice", "t0", "h0"))
            .unwrap();

        let mut current = Status::Created;
        let mut writes = 1;
        for (step, target) in targets.into_iter().enumerate() {
            let submission =
                Submission::new("SAP", "INV-1", format!("user_{step}"), format!("t{step}"), "h");
            let result = service.transition(target, submission);

            if target.rank() >= current.rank() {
                prop_assert!(result.is_ok());
                current = target;
                writes += 1;
            } else {
                let is_invalid = matches!(result, Err(EdocError::InvalidTransition { .. }));
                prop_assert!(is_invalid);
            }
            prop_assert_eq!(service.query_record("SAP", "INV-1").unwrap().status, current);
        }

        // rejected transitions never reach the ledger
        prop_assert_eq!(service.query_history("SAP", "INV-1").unwrap().count(), writes);
    }

    /// History has one entry per successful write, in write order, ending at the current record
    #[test]
    fn history_replays_writes(steps in 0usize..8) {
        let service = service();
        let mut tx_ids = vec![service
            .create(Submission::new("SAP", "INV-1", "alice", "t0", "h0"))
            .unwrap()];
        for step in 0..steps {
            let n = step + 1;
            let submission =
                Submission::new("SAP", "INV-1", "bob", format!("t{n}"), format!("h{n}"));
            tx_ids.push(service.modify(submission).unwrap());
        }

        let history: Vec<_> = service
            .query_history("SAP", "INV-1")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        prop_assert_eq!(history.len(), steps + 1);
        let recorded: Vec<String> = history.iter().map(|h| h.tx_id.clone()).collect();
        prop_assert_eq!(recorded, tx_ids);

        let last = history.last().unwrap().document().unwrap();
        prop_assert_eq!(last, service.query_record("SAP", "INV-1").unwrap());
    }

    /// The rank order agrees with the derived order of the enum
    #[test]
    fn rank_agrees_with_ord(a in any_status(), b in any_status()) {
        prop_assert_eq!(a.can_transition_to(b), a <= b);
        prop_assert_eq!(a.rank().cmp(&b.rank()), a.cmp(&b));
    }

    /// Distinct (system, document) pairs never map to the same key
    #[test]
    fn keys_are_injective(
        a in (component_strategy(), component_strategy()),
        b in (component_strategy(), component_strategy()),
    ) {
        let key_a = compute_key(&a.0, &a.1).unwrap();
        let key_b = compute_key(&b.0, &b.1).unwrap();
        prop_assert_eq!(key_a == key_b, a == b);
    }
}
