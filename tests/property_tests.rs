//! Property tests for request-audit.
//!
//! These tests validate classifier precedence over the whole input space and
//! check that nothing on the publish path can fail the caller, whatever it
//! is handed.

use std::collections::HashMap;

use proptest::prelude::*;
use request_audit::audit::{
    AuditData, AuditPublisher, BatchOptions, MemoryTransport, PublisherConfig, RequestStatus,
    FLUSH_INTERVAL_MS_VAR, MAX_BATCH_BYTES_VAR, MAX_BATCH_EVENTS_VAR, PROJECT_ID_VAR,
    QUEUE_CAPACITY_VAR, SHUTDOWN_TIMEOUT_MS_VAR, TOPIC_VAR,
};
use request_audit::{classify, CacheType, ClassificationInput};
use serde_json::{json, Value};

// Strategy: Generate arbitrary execution facts
fn arb_input() -> impl Strategy<Value = ClassificationInput> {
    (
        prop::collection::vec("[a-z_]{1,12}", 0..4),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(names, external, from_cache, from_in_memory_cache)| {
            let mut input = ClassificationInput::new()
                .with_external(external)
                .with_from_cache(from_cache)
                .with_from_in_memory_cache(from_in_memory_cache);
            for name in names {
                input = input.with_pre_aggregation(name, json!({}));
            }
            input
        })
}

// Strategy: Generate arbitrary JSON values, a few levels deep
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        ".{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::hash_map("[a-z_]{1,12}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn arb_status() -> impl Strategy<Value = RequestStatus> {
    prop_oneof![
        Just(RequestStatus::Acknowledged),
        Just(RequestStatus::Success),
        Just(RequestStatus::ContinueWait),
        Just(RequestStatus::Error),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// Property: The in-memory cache flag wins over every other fact
    #[test]
    fn proptest_in_memory_cache_wins(input in arb_input()) {
        let input = input.with_from_in_memory_cache(true);
        prop_assert_eq!(classify(&input), CacheType::InMemoryCache);
    }

    /// Property: A persistent cache hit wins over pre-aggregation facts
    #[test]
    fn proptest_persistent_cache_wins_over_pre_aggregations(input in arb_input()) {
        let input = input.with_from_in_memory_cache(false).with_from_cache(true);
        prop_assert_eq!(classify(&input), CacheType::PersistentCache);
    }

    /// Property: Without a cache hit, pre-aggregation use decides the tier
    #[test]
    fn proptest_uncached_results_follow_pre_aggregation_use(input in arb_input()) {
        let input = input.with_from_in_memory_cache(false).with_from_cache(false);
        let expected = match (input.used_any_pre_aggregation(), input.external) {
            (true, true) => CacheType::PreAggregationsExternalStore,
            (true, false) => CacheType::PreAggregationsDataSource,
            (false, _) => CacheType::NoCache,
        };
        prop_assert_eq!(classify(&input), expected);
        prop_assert!(!classify(&input).is_cache_hit());
    }

    /// Property: Classification is deterministic and agrees with the method form
    #[test]
    fn proptest_classify_is_deterministic(input in arb_input()) {
        let first = classify(&input);
        prop_assert_eq!(first, classify(&input.clone()));
        prop_assert_eq!(first, input.classify());
        prop_assert!(CacheType::ALL.contains(&first));
    }

    /// Property: Orchestrator fact objects deserialize to the same label
    #[test]
    fn proptest_fact_objects_classify_like_built_inputs(input in arb_input()) {
        let facts = serde_json::to_value(&input).unwrap();
        let parsed: ClassificationInput = serde_json::from_value(facts).unwrap();
        prop_assert_eq!(classify(&parsed), classify(&input));
    }

    /// Property: The disabled publisher accepts anything without effect
    #[test]
    fn proptest_disabled_publisher_accepts_any_input(
        request_id in ".{0,24}",
        raw in arb_json(),
        status in arb_status()
    ) {
        let publisher = AuditPublisher::Disabled;
        publisher.publish(AuditData::new(request_id, "rest", status), status);
        publisher.publish_value(raw, status);
        prop_assert!(!publisher.is_enabled());
    }

    /// Property: Configuration parsing never panics on arbitrary values
    #[test]
    fn proptest_config_from_arbitrary_env(
        values in prop::collection::vec(prop::option::of(".{0,12}"), 7)
    ) {
        let keys = [
            PROJECT_ID_VAR,
            TOPIC_VAR,
            MAX_BATCH_BYTES_VAR,
            MAX_BATCH_EVENTS_VAR,
            FLUSH_INTERVAL_MS_VAR,
            QUEUE_CAPACITY_VAR,
            SHUTDOWN_TIMEOUT_MS_VAR,
        ];
        let env: HashMap<&str, Option<String>> = keys.iter().copied().zip(values).collect();
        let config = PublisherConfig::from_lookup(|key| env.get(key).cloned().flatten());

        let has_target = [PROJECT_ID_VAR, TOPIC_VAR].iter().all(|key| {
            env[key]
                .as_deref()
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false)
        });
        prop_assert_eq!(config.target().is_some(), has_target);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: Untyped data bags are published or dropped, never raised
    #[test]
    fn proptest_active_publisher_never_fails_on_untyped_data(
        raw in arb_json(),
        status in arb_status()
    ) {
        let well_formed = serde_json::from_value::<AuditData>(raw.clone()).is_ok();
        let transport = MemoryTransport::new();
        let handle = transport.clone();

        runtime().block_on(async move {
            let config = PublisherConfig::new("proj", "request-audit").with_batch(BatchOptions {
                max_bytes: None,
                max_events: Some(1),
                flush_interval: None,
            });
            let publisher = AuditPublisher::from_config_with(&config, move |_| Ok(transport));
            publisher.publish_value(raw, status);
            publisher.close().await;
        });

        prop_assert_eq!(handle.event_count(), usize::from(well_formed));
    }
}
