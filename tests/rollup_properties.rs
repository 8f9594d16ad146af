//! End-to-end tally behaviour through `EntityStatisticService`.
//!
//! Covers the rollup contract on a small three-level org hierarchy:
//!   root -> {a, b}, a -> {x, y}; x = red, y = red, b = blue

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use entity_stats::core::{
    EntityKind, EntityReference, HierarchyEdge, HierarchyQueryScope, IdSelectionOptions,
    MemoryStatisticStore, RollupKind, StatisticStore, StatsConfig, StatsError, TallyPack,
};

use helpers::*;

fn pack(packs: &[TallyPack<String>], entity: EntityReference) -> &TallyPack<String> {
    packs
        .iter()
        .find(|p| p.entity_reference == entity)
        .unwrap_or_else(|| panic!("no pack for {entity}"))
}

fn edge(parent: EntityReference, child: EntityReference) -> HierarchyEdge {
    HierarchyEdge::new(parent, child)
}

fn children_of_root() -> IdSelectionOptions {
    IdSelectionOptions::new(ou(ROOT), HierarchyQueryScope::Children)
}

// =============================================================================
// Aggregation
// =============================================================================

#[tokio::test]
async fn count_distinct_values_rolls_up_each_level() {
    let svc = service_over(
        Arc::new(colour_store()),
        three_level_edges(),
        &StatsConfig::default(),
    );

    let packs = svc
        .calculate_stat_tally(1, "COUNT_DISTINCT_VALUES", &children_of_root())
        .await
        .unwrap();

    let a = pack(&packs, ou(A));
    assert_eq!(a.tallies.len(), 1);
    assert_eq!(a.count_of("red"), 2);

    let root = pack(&packs, ou(ROOT));
    assert_eq!(root.tallies.len(), 2);
    assert_eq!(root.count_of("red"), 2);
    assert_eq!(root.count_of("blue"), 1);

    assert_eq!(pack(&packs, ou(B)).count_of("blue"), 1);
    assert_eq!(pack(&packs, ou(X)).count_of("red"), 1);
}

#[tokio::test]
async fn exact_rollup_never_aggregates() {
    let svc = service_over(
        Arc::new(colour_store()),
        three_level_edges(),
        &StatsConfig::default(),
    );

    let packs = svc
        .calculate_stat_tally(1, "EXACT", &children_of_root())
        .await
        .unwrap();
    assert!(pack(&packs, ou(ROOT)).tallies.is_empty());
    assert!(pack(&packs, ou(A)).tallies.is_empty());
    assert_eq!(pack(&packs, ou(Y)).count_of("red"), 1);

    let exact_root = IdSelectionOptions::new(ou(ROOT), HierarchyQueryScope::Exact);
    let packs = svc.calculate_stat_tally(1, "EXACT", &exact_root).await.unwrap();
    assert_eq!(packs.len(), 1);
    assert!(packs[0].tallies.is_empty());
}

#[tokio::test]
async fn none_rollup_skips_fetch_and_returns_nothing() {
    let store = Arc::new(CountingStore::new(colour_store()));
    let svc = service_over(store.clone(), three_level_edges(), &StatsConfig::default());

    let packs = svc
        .calculate_stat_tally(1, "NONE", &children_of_root())
        .await
        .unwrap();
    assert!(packs.is_empty());
    assert_eq!(store.fetch_count(), 0);
}

#[tokio::test]
async fn repeated_calls_are_identical() {
    let svc = service_over(
        Arc::new(colour_store()),
        three_level_edges(),
        &StatsConfig::default(),
    );
    let first = svc
        .calculate_stat_tally(1, "COUNT_DISTINCT_VALUES", &children_of_root())
        .await
        .unwrap();
    let second = svc
        .calculate_stat_tally(1, "COUNT_DISTINCT_VALUES", &children_of_root())
        .await
        .unwrap();
    assert_eq!(first, second);

    let order: Vec<EntityReference> = first.iter().map(|p| p.entity_reference).collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
}

#[tokio::test]
async fn null_counting_is_opt_in() {
    let config = StatsConfig::from_yaml_str("rollup:\n  count_missing: true\n").unwrap();
    let svc = service_over(Arc::new(colour_store()), three_level_edges(), &config);

    let packs = svc
        .calculate_stat_tally(1, "COUNT_DISTINCT_VALUES", &children_of_root())
        .await
        .unwrap();
    let root = pack(&packs, ou(ROOT));
    assert_eq!(root.count_of("(none)"), 2);
    assert_eq!(root.total(), 5);
}

// =============================================================================
// Validation and not-found
// =============================================================================

#[tokio::test]
async fn unknown_rollup_kind_rejected_before_fetch() {
    let store = Arc::new(CountingStore::new(colour_store()));
    let svc = service_over(store.clone(), three_level_edges(), &StatsConfig::default());

    let err = svc
        .calculate_stat_tally(1, "BOGUS", &children_of_root())
        .await
        .unwrap_err();

    assert!(matches!(err, StatsError::Validation(_)));
    assert_eq!(err.http_status(), 400);
    assert_eq!(store.fetch_count(), 0);
}

#[tokio::test]
async fn malformed_selection_rejected_before_fetch() {
    let store = Arc::new(CountingStore::new(colour_store()));
    let svc = service_over(store.clone(), three_level_edges(), &StatsConfig::default());

    let bad = IdSelectionOptions::new(ou(0), HierarchyQueryScope::Children);
    let err = svc
        .calculate_stat_tally(1, "EXACT", &bad)
        .await
        .unwrap_err();
    assert!(matches!(err, StatsError::Validation(_)));
    assert!(svc.find_stat_tallies(&[1], &bad).await.is_err());
    assert_eq!(store.fetch_count(), 0);
}

#[tokio::test]
async fn unknown_statistic_is_not_found() {
    let svc = service_over(
        Arc::new(colour_store()),
        three_level_edges(),
        &StatsConfig::default(),
    );
    let err = svc
        .calculate_stat_tally(42, "EXACT", &children_of_root())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    // List operations return empty instead.
    let packs = svc.find_stat_tallies(&[42], &children_of_root()).await.unwrap();
    assert!(packs.is_empty());
    let values = svc
        .get_statistic_values_for_app_id_selector(42, &children_of_root())
        .await
        .unwrap();
    assert!(values.is_empty());
}

// =============================================================================
// Entities outside the hierarchy
// =============================================================================

#[tokio::test]
async fn entity_absent_from_hierarchy_uses_its_own_value() {
    let store = MemoryStatisticStore::with_data(
        [definition(1, RollupKind::CountDistinctValues)],
        [value(1, app(777), "orphan")],
    );
    let svc = service_over(Arc::new(store), three_level_edges(), &StatsConfig::default());

    let opts = IdSelectionOptions::new(app(777), HierarchyQueryScope::Exact);
    for kind in ["COUNT_DISTINCT_VALUES", "EXACT"] {
        let packs = svc.calculate_stat_tally(1, kind, &opts).await.unwrap();
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].entity_reference, app(777));
        assert_eq!(packs[0].count_of("orphan"), 1);
    }

    let children = IdSelectionOptions::new(app(777), HierarchyQueryScope::Children);
    let packs = svc
        .calculate_stat_tally(1, "COUNT_DISTINCT_VALUES", &children)
        .await
        .unwrap();
    assert_eq!(packs.len(), 1);
}

// =============================================================================
// Multi-statistic tallies
// =============================================================================

#[tokio::test]
async fn find_stat_tallies_uses_each_default_kind() {
    let store = MemoryStatisticStore::with_data(
        [
            definition(1, RollupKind::CountDistinctValues),
            definition(2, RollupKind::Exact),
            definition(3, RollupKind::None),
        ],
        [
            value(1, app(10), "yes"),
            value(1, app(11), "no"),
            value(1, app(12), "yes"),
            value(2, ou(ROOT), "central"),
            value(2, app(10), "local"),
            value(3, app(10), "ignored"),
        ],
    );
    let store = Arc::new(CountingStore::new(store));
    let mut edges = three_level_edges();
    edges.push(edge(ou(X), app(10)));
    edges.push(edge(ou(Y), app(11)));
    edges.push(edge(ou(B), app(12)));
    let svc = service_over(store.clone(), edges, &StatsConfig::default());

    let packs = svc
        .find_stat_tallies(&[3, 1, 2], &children_of_root())
        .await
        .unwrap();

    let subjects: Vec<i64> = packs.iter().map(|p| p.entity_reference.id).collect();
    assert_eq!(subjects, vec![1, 2, 3]);
    assert!(packs
        .iter()
        .all(|p| p.entity_reference.kind == EntityKind::EntityStatistic));

    assert_eq!(packs[0].count_of("yes"), 2);
    assert_eq!(packs[0].count_of("no"), 1);
    assert_eq!(packs[1].count_of("central"), 1);
    assert_eq!(packs[1].count_of("local"), 0);
    assert!(packs[2].tallies.is_empty());
    // NONE statistics are never fetched.
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn find_stat_tallies_with_kind_filter() {
    let store = MemoryStatisticStore::with_data(
        [definition(1, RollupKind::CountDistinctValues)],
        [
            value(1, app(10), "yes"),
            value(1, app(11), "yes"),
            value(1, ou(A), "org-level"),
        ],
    );
    let mut edges = three_level_edges();
    edges.push(edge(ou(X), app(10)));
    edges.push(edge(ou(B), app(11)));
    let svc = service_over(Arc::new(store), edges, &StatsConfig::default());

    let opts = children_of_root().with_entity_kind(EntityKind::Application);
    let packs = svc.find_stat_tallies(&[1], &opts).await.unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].count_of("yes"), 2);
    assert_eq!(packs[0].count_of("org-level"), 0);
}

/// Five COUNT_DISTINCT_VALUES statistics, one value each on x.
fn five_statistics() -> MemoryStatisticStore {
    MemoryStatisticStore::with_data(
        (1..=5).map(|id| definition(id, RollupKind::CountDistinctValues)),
        (1..=5).map(|id| value(id, ou(X), "red")),
    )
}

fn fan_out_config(max_concurrent: usize) -> StatsConfig {
    StatsConfig::from_yaml_str(&format!(
        "fetch:\n  timeout_ms: null\n  max_concurrent: {max_concurrent}\n"
    ))
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn find_stat_tallies_bounds_concurrent_fetches() {
    let delay = Duration::from_millis(100);
    let store = Arc::new(PeakStore::new(five_statistics(), delay));
    let svc = service_over(store.clone(), three_level_edges(), &fan_out_config(2));

    let started = tokio::time::Instant::now();
    let packs = svc
        .find_stat_tallies(&[1, 2, 3, 4, 5], &children_of_root())
        .await
        .unwrap();

    assert_eq!(packs.len(), 5);
    assert!(packs.iter().all(|p| p.count_of("red") == 1));
    assert_eq!(store.peak(), 2);
    // Three waves of at most two fetches.
    assert!(started.elapsed() < delay * 5);
    assert!(started.elapsed() >= delay * 3);
}

#[tokio::test(start_paused = true)]
async fn single_fetch_slot_runs_serially() {
    let delay = Duration::from_millis(100);
    let store = Arc::new(PeakStore::new(five_statistics(), delay));
    let svc = service_over(store.clone(), three_level_edges(), &fan_out_config(1));

    let started = tokio::time::Instant::now();
    let packs = svc
        .find_stat_tallies(&[1, 2, 3, 4, 5], &children_of_root())
        .await
        .unwrap();

    assert_eq!(packs.len(), 5);
    assert_eq!(store.peak(), 1);
    assert!(started.elapsed() >= delay * 5);
}

// =============================================================================
// Timeouts
// =============================================================================

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out_without_partial_results() {
    let slow = SlowStore::new(colour_store(), Duration::from_secs(10));
    let svc = service_over(Arc::new(slow), three_level_edges(), &StatsConfig::default());

    let err = svc
        .calculate_stat_tally_within(
            1,
            "COUNT_DISTINCT_VALUES",
            &children_of_root(),
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StatsError::Timeout(d) if d == Duration::from_millis(100)));
    assert_eq!(err.http_status(), 504);

    let err = svc
        .find_stat_tallies_within(&[1], &children_of_root(), Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, StatsError::Timeout(_)));
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_applies_by_default() {
    let slow = SlowStore::new(colour_store(), Duration::from_secs(10));
    let config = StatsConfig::from_yaml_str("fetch:\n  timeout_ms: 50\n").unwrap();
    let svc = service_over(Arc::new(slow), three_level_edges(), &config);

    let err = svc
        .calculate_stat_tally(1, "EXACT", &children_of_root())
        .await
        .unwrap_err();
    assert!(matches!(err, StatsError::Timeout(_)));
}

#[tokio::test(start_paused = true)]
async fn no_timeout_waits_for_slow_fetch() {
    let slow = SlowStore::new(colour_store(), Duration::from_secs(10));
    let config = StatsConfig::from_yaml_str("fetch:\n  timeout_ms: null\n").unwrap();
    let svc = service_over(Arc::new(slow), three_level_edges(), &config);

    let packs = svc
        .calculate_stat_tally(1, "COUNT_DISTINCT_VALUES", &children_of_root())
        .await
        .unwrap();
    assert_eq!(pack(&packs, ou(ROOT)).total(), 3);
}

// =============================================================================
// Snapshot refresh
// =============================================================================

#[tokio::test]
async fn refresh_is_visible_to_later_calls_only() {
    let store: Arc<dyn StatisticStore> = Arc::new(colour_store());
    let svc = service_over(store, three_level_edges(), &StatsConfig::default());

    let before = svc.hierarchy().snapshot();

    // Move b under a.
    svc.hierarchy()
        .refresh([
            edge(ou(ROOT), ou(A)),
            edge(ou(A), ou(B)),
            edge(ou(A), ou(X)),
            edge(ou(A), ou(Y)),
        ])
        .unwrap();

    assert_eq!(before.parent(&ou(B)).unwrap(), Some(ou(ROOT)));

    let packs = svc
        .calculate_stat_tally(1, "COUNT_DISTINCT_VALUES", &children_of_root())
        .await
        .unwrap();
    let a = pack(&packs, ou(A));
    assert_eq!(a.count_of("red"), 2);
    assert_eq!(a.count_of("blue"), 1);
}
