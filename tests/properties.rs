//! Property tests for the frontier, proxy health and change detection

use proptest::prelude::*;
use serde_json::{Map, Value};
use std::time::Duration;

use siphon::crawler::CrawlFrontier;
use siphon::models::JobState;
use siphon::monitor::ChangeDetector;
use siphon::proxy::{AttemptOutcome, HealthPolicy, HealthRecord};
use siphon::scheduler::{can_transition, is_valid_path};

#[derive(Debug, Clone)]
enum FrontierOp {
    Add(u8, u32),
    Pop,
}

fn frontier_op() -> impl Strategy<Value = FrontierOp> {
    prop_oneof![
        3 => (0u8..40, 0u32..8).prop_map(|(page, depth)| FrontierOp::Add(page, depth)),
        1 => Just(FrontierOp::Pop),
    ]
}

fn outcome() -> impl Strategy<Value = AttemptOutcome> {
    (any::<bool>(), 0u64..2000).prop_map(|(success, ms)| AttemptOutcome {
        success,
        latency: Duration::from_millis(ms),
    })
}

fn snapshot() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-e]", 0i64..3, 0..5).prop_map(|fields| {
        Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect::<Map<String, Value>>(),
        )
    })
}

fn state() -> impl Strategy<Value = JobState> {
    prop_oneof![
        Just(JobState::Queued),
        Just(JobState::Running),
        Just(JobState::Completed),
        Just(JobState::Failed),
        Just(JobState::Cancelled),
    ]
}

proptest! {
    #[test]
    fn frontier_invariants_hold_after_every_mutation(
        max_depth in 1u32..=5,
        max_pages in 1usize..20,
        ops in prop::collection::vec(frontier_op(), 0..120),
    ) {
        let mut frontier = CrawlFrontier::new(max_depth, max_pages);
        let mut popped = std::collections::HashSet::new();

        for op in ops {
            match op {
                FrontierOp::Add(page, depth) => {
                    frontier.add_if_allowed(&format!("https://site.test/{page}"), depth);
                }
                FrontierOp::Pop => {
                    if let Some(entry) = frontier.pop_next() {
                        prop_assert!(popped.insert(entry.url.clone()), "url popped twice");
                        prop_assert!(entry.depth <= max_depth);
                    }
                }
            }
            prop_assert!(frontier.invariants_hold());
            prop_assert!(frontier.known() <= max_pages);
            prop_assert!(frontier.pending().all(|e| e.depth <= max_depth));
        }
    }

    #[test]
    fn proxy_status_is_deterministic(outcomes in prop::collection::vec(outcome(), 0..60)) {
        let policy = HealthPolicy::default();
        let first = HealthRecord::replay(&policy, &outcomes);
        let second = HealthRecord::replay(&policy, &outcomes);

        prop_assert_eq!(first.status(), second.status());
        prop_assert_eq!(first.success_rate(), second.success_rate());
        prop_assert_eq!(first.total_attempts(), outcomes.len() as u64);
    }

    #[test]
    fn change_fraction_is_bounded_and_symmetric(prev in snapshot(), curr in snapshot()) {
        let forward = ChangeDetector::diff(&prev, &curr);
        let backward = ChangeDetector::diff(&curr, &prev);

        prop_assert!((0.0..=1.0).contains(&forward));
        prop_assert_eq!(forward, backward);
        prop_assert_eq!(ChangeDetector::diff(&curr, &curr), 0.0);
    }

    #[test]
    fn valid_paths_only_use_permitted_transitions(states in prop::collection::vec(state(), 0..8)) {
        if is_valid_path(&states) {
            for pair in states.windows(2) {
                prop_assert!(!pair[0].is_terminal());
                prop_assert!(can_transition(pair[0], pair[1]));
            }
        }
    }
}
