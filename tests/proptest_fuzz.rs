//! Property-based tests for the hybrid data layer.
//!
//! Uses proptest to generate random/malformed inputs and verify the core
//! invariants hold: merges deduplicate, caches never exceed capacity,
//! weights behave monotonically, and adapters never panic.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::time::Duration;

use proptest::prelude::*;
use serde_json::{json, Value};

use hybrid_engine::{
    sources::adapt, CachedPayload, DataSource, EvictionPolicy, MergedRecord, SourceWeights,
    TtlCache,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn record(id: String, score: f64, source: DataSource) -> MergedRecord {
    MergedRecord::new(id.clone(), id, score, source)
}

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(4, 64, 10, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
            prop::collection::hash_map(".*", inner, 0..10)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Distinct identities with bounded scores
fn record_set_strategy(prefix: &'static str) -> impl Strategy<Value = Vec<(String, u32)>> {
    prop::collection::btree_map(0u32..50, 1u32..1000, 1..8).prop_map(move |m| {
        m.into_iter()
            .map(|(id, score)| (format!("{}{:02}", prefix, id), score))
            .collect()
    })
}

// =============================================================================
// Merge Properties
// =============================================================================

proptest! {
    /// Merging a record list with itself keeps each identity exactly once
    #[test]
    fn merge_with_itself_is_idempotent(entries in record_set_strategy("u")) {
        let build = || {
            entries
                .iter()
                .map(|(id, score)| record(id.clone(), *score as f64, DataSource::Real))
                .collect::<Vec<_>>()
        };

        let set = hybrid_engine::merge::merge(
            build(),
            build(),
            &SourceWeights::default(),
            usize::MAX,
        );

        prop_assert_eq!(set.records.len(), entries.len());

        let mut ids: Vec<_> = set.records.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), set.records.len());
    }

    /// Raising the synthetic weight never shrinks synthetic representation
    /// in the top-limit result
    #[test]
    fn synthetic_weight_is_monotone(
        real in record_set_strategy("r"),
        synthetic in record_set_strategy("s"),
        low in 0.05f64..0.5,
        boost in 0.0f64..0.5,
        limit in 1usize..12,
    ) {
        let high = low + boost;
        let count_at = |weight: f64| {
            let set = hybrid_engine::merge::merge(
                real.iter()
                    .map(|(id, score)| record(id.clone(), *score as f64, DataSource::Real))
                    .collect(),
                synthetic
                    .iter()
                    .map(|(id, score)| record(id.clone(), *score as f64, DataSource::Synthetic))
                    .collect(),
                &SourceWeights { real: 1.0, synthetic: weight },
                limit,
            );
            set.synthetic_count
        };

        prop_assert!(count_at(high) >= count_at(low));
    }

    /// Dedup keeps the first-seen (real) record on identity collisions
    #[test]
    fn real_always_wins_collisions(shared in record_set_strategy("x")) {
        let real: Vec<_> = shared
            .iter()
            .map(|(id, score)| record(id.clone(), *score as f64, DataSource::Real))
            .collect();
        let synthetic: Vec<_> = shared
            .iter()
            .map(|(id, score)| record(id.clone(), (*score * 7) as f64, DataSource::Synthetic))
            .collect();

        let set = hybrid_engine::merge::merge(
            real,
            synthetic,
            &SourceWeights { real: 1.0, synthetic: 1.0 },
            usize::MAX,
        );

        prop_assert!(set.records.iter().all(|r| r.data_source == DataSource::Real));
    }
}

// =============================================================================
// Cache Properties
// =============================================================================

proptest! {
    /// No sequence of writes pushes the cache past its capacity
    #[test]
    fn cache_never_exceeds_capacity(
        keys in prop::collection::vec(0u32..40, 1..100),
        capacity in 1usize..10,
        policy in prop_oneof![
            Just(EvictionPolicy::Lru),
            Just(EvictionPolicy::Fifo),
            Just(EvictionPolicy::TtlSweep),
        ],
    ) {
        let cache = TtlCache::new(capacity, Duration::from_secs(60), policy);

        for key in keys {
            cache.set(
                format!("k{}", key),
                CachedPayload::Records(vec![record(format!("r{}", key), 1.0, DataSource::Real)]),
            );
            prop_assert!(cache.len() <= capacity);
        }
    }

    /// Reads interleaved with writes never observe more than capacity either
    #[test]
    fn cache_reads_after_writes_are_consistent(
        ops in prop::collection::vec((0u32..20, any::<bool>()), 1..60),
    ) {
        let cache = TtlCache::new(5, Duration::from_secs(60), EvictionPolicy::Lru);

        for (key, is_write) in ops {
            let key = format!("k{}", key);
            if is_write {
                cache.set(
                    key.clone(),
                    CachedPayload::Records(vec![record(key, 1.0, DataSource::Real)]),
                );
            } else {
                // May or may not be present; must never panic
                let _ = cache.get(&key);
            }
            prop_assert!(cache.len() <= 5);
        }
    }
}

// =============================================================================
// Adapter Fuzz Tests
// =============================================================================

proptest! {
    /// Adapters accept arbitrary JSON without panicking
    #[test]
    fn adapters_never_panic_on_arbitrary_json(row in arbitrary_json_strategy()) {
        let _ = adapt::leaderboard_row(DataSource::Real, &row);
        let _ = adapt::achievement_row(DataSource::Synthetic, &row);
        let _ = adapt::challenge_row(DataSource::Real, &row);
        let _ = adapt::stats_row(&row);
    }

    /// Whole-response adaptation either succeeds or fails cleanly
    #[test]
    fn adapt_rows_never_panics(rows in prop::collection::vec(arbitrary_json_strategy(), 0..20)) {
        let _ = adapt::adapt_rows(DataSource::Real, &rows, adapt::leaderboard_row);
        let _ = adapt::adapt_rows(DataSource::Synthetic, &rows, adapt::achievement_row);
    }

    /// Rows with a string identity always adapt, whatever else they carry
    #[test]
    fn identified_rows_always_adapt(
        id in "[a-z0-9-]{1,16}",
        extra in arbitrary_json_strategy(),
    ) {
        let row = json!({"user_id": id.as_str(), "payload": extra});
        let adapted = adapt::leaderboard_row(DataSource::Real, &row);
        prop_assert!(adapted.is_some());
        prop_assert_eq!(adapted.unwrap().id, id);
    }
}
