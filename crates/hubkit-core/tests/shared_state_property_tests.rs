//! Property-based tests for shared state versioning
//!
//! A lookup as of version V must never observe an entry newer than V, and
//! versions of one owner only ever move forward.

use hubkit_core::{EventData, SharedState, SharedStateStatus};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;

fn snapshot(version: u64) -> Option<EventData> {
    let mut data = EventData::new();
    data.insert("version".into(), json!(version));
    Some(data)
}

/// Generate a set of distinct versions
fn arb_versions() -> impl Strategy<Value = BTreeSet<u64>> {
    prop::collection::btree_set(0u64..10_000, 1..50)
}

proptest! {
    #[test]
    fn prop_resolve_never_returns_newer_version(
        versions in arb_versions(),
        queries in prop::collection::vec(0u64..11_000, 1..50),
    ) {
        let mut state = SharedState::new("com.example.config");
        for version in &versions {
            state.set(*version, snapshot(*version)).unwrap();
        }

        for query in queries {
            let result = state.resolve(Some(query));
            let expected = versions.range(..=query).next_back().copied();

            match expected {
                Some(version) => {
                    prop_assert_eq!(result.status, SharedStateStatus::Set);
                    prop_assert_eq!(result.version, Some(version));
                    prop_assert!(version <= query);
                    prop_assert_eq!(result.value, snapshot(version));
                }
                None => {
                    prop_assert_eq!(result.status, SharedStateStatus::None);
                    prop_assert_eq!(result.value, None);
                }
            }
        }
    }

    #[test]
    fn prop_only_increasing_writes_are_accepted(
        writes in prop::collection::vec(0u64..500, 1..100),
    ) {
        let mut state = SharedState::new("com.example.identity");
        let mut latest: Option<u64> = None;

        for version in writes {
            let accepted = state.set(version, snapshot(version)).is_ok();
            let should_accept = latest.map_or(true, |latest| version > latest);
            prop_assert_eq!(accepted, should_accept);
            if accepted {
                latest = Some(version);
            }
            prop_assert_eq!(state.latest_version(), latest);
        }

        prop_assert_eq!(state.resolve(None).version, latest);
    }

    #[test]
    fn prop_pending_slot_keeps_its_version(
        pending in 1u64..1_000,
        later in prop::collection::btree_set(1_001u64..2_000, 0..10),
    ) {
        let mut state = SharedState::new("com.example.identity");
        state.add_pending(pending).unwrap();
        for version in &later {
            state.set(*version, snapshot(*version)).unwrap();
        }

        let first_later = later.iter().next().copied().unwrap_or(u64::MAX);
        prop_assert!(state.resolve(Some(first_later - 1)).is_pending());

        state.resolve_pending(pending, snapshot(pending)).unwrap();
        let resolved = state.resolve(Some(pending));
        prop_assert!(resolved.is_set());
        prop_assert_eq!(resolved.version, Some(pending));
        prop_assert_eq!(resolved.value, snapshot(pending));
    }
}
