//! Shared fixtures and store doubles for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use entity_stats::core::{
    EntityReference, EntityStatisticService, HierarchyEdge, HierarchyIndex, MemoryStatisticStore,
    Result, RollupKind, StatisticCategory, StatisticDefinition, StatisticStore, StatisticValue,
    StatsConfig,
};

pub fn ou(id: i64) -> EntityReference {
    EntityReference::org_unit(id)
}

pub fn app(id: i64) -> EntityReference {
    EntityReference::application(id)
}

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap()
}

pub fn definition(id: i64, rollup_kind: RollupKind) -> StatisticDefinition {
    StatisticDefinition {
        id,
        name: format!("stat-{id}"),
        description: None,
        category: StatisticCategory::Governance,
        rollup_kind,
        active: true,
        parent_id: None,
        provenance: Some("test".into()),
    }
}

pub fn value(statistic_id: i64, entity: EntityReference, v: &str) -> StatisticValue {
    StatisticValue {
        entity,
        statistic_id,
        value: Some(v.to_string()),
        outcome: None,
        created_at: at(1),
        current: true,
        provenance: None,
    }
}

/// root(1) -> {a(2), b(3)}, a -> {x(4), y(5)}
pub const ROOT: i64 = 1;
pub const A: i64 = 2;
pub const B: i64 = 3;
pub const X: i64 = 4;
pub const Y: i64 = 5;

pub fn three_level_edges() -> Vec<HierarchyEdge> {
    vec![
        HierarchyEdge::new(ou(ROOT), ou(A)),
        HierarchyEdge::new(ou(ROOT), ou(B)),
        HierarchyEdge::new(ou(A), ou(X)),
        HierarchyEdge::new(ou(A), ou(Y)),
    ]
}

/// x = red, y = red, b = blue for statistic 1.
pub fn colour_store() -> MemoryStatisticStore {
    MemoryStatisticStore::with_data(
        [definition(1, RollupKind::CountDistinctValues)],
        [
            value(1, ou(X), "red"),
            value(1, ou(Y), "red"),
            value(1, ou(B), "blue"),
        ],
    )
}

/// Wraps a store and counts `fetch_values` calls.
pub struct CountingStore<S> {
    inner: S,
    fetches: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: StatisticStore> StatisticStore for CountingStore<S> {
    async fn fetch_values(
        &self,
        statistic_id: i64,
        entities: &[EntityReference],
    ) -> Result<Vec<StatisticValue>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_values(statistic_id, entities).await
    }

    async fn fetch_definition(&self, statistic_id: i64) -> Result<Option<StatisticDefinition>> {
        self.inner.fetch_definition(statistic_id).await
    }

    async fn fetch_definitions(&self, active_only: bool) -> Result<Vec<StatisticDefinition>> {
        self.inner.fetch_definitions(active_only).await
    }
}

/// Wraps a store and delays every `fetch_values` call.
pub struct SlowStore<S> {
    inner: S,
    delay: Duration,
}

impl<S> SlowStore<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<S: StatisticStore> StatisticStore for SlowStore<S> {
    async fn fetch_values(
        &self,
        statistic_id: i64,
        entities: &[EntityReference],
    ) -> Result<Vec<StatisticValue>> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_values(statistic_id, entities).await
    }

    async fn fetch_definition(&self, statistic_id: i64) -> Result<Option<StatisticDefinition>> {
        self.inner.fetch_definition(statistic_id).await
    }

    async fn fetch_definitions(&self, active_only: bool) -> Result<Vec<StatisticDefinition>> {
        self.inner.fetch_definitions(active_only).await
    }
}

/// Wraps a store, delays every `fetch_values` call and records the highest
/// number of calls in flight at once.
pub struct PeakStore<S> {
    inner: S,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl<S> PeakStore<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: StatisticStore> StatisticStore for PeakStore<S> {
    async fn fetch_values(
        &self,
        statistic_id: i64,
        entities: &[EntityReference],
    ) -> Result<Vec<StatisticValue>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.fetch_values(statistic_id, entities).await
    }

    async fn fetch_definition(&self, statistic_id: i64) -> Result<Option<StatisticDefinition>> {
        self.inner.fetch_definition(statistic_id).await
    }

    async fn fetch_definitions(&self, active_only: bool) -> Result<Vec<StatisticDefinition>> {
        self.inner.fetch_definitions(active_only).await
    }
}

pub fn service_over(
    store: Arc<dyn StatisticStore>,
    edges: Vec<HierarchyEdge>,
    config: &StatsConfig,
) -> EntityStatisticService {
    let hierarchy = HierarchyIndex::from_edges(edges).expect("acyclic test hierarchy");
    EntityStatisticService::new(store, Arc::new(hierarchy), config)
}
