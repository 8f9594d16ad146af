//! In-memory adapters for `StatisticStore` and `HierarchySource`.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::error::Result;
use crate::store::{HierarchySource, StatisticStore};
use crate::types::{EntityReference, HierarchyEdge, StatisticDefinition, StatisticValue};

/// In-memory StatisticStore for testing and the CLI.
#[derive(Default)]
pub struct MemoryStatisticStore {
    definitions: RwLock<BTreeMap<i64, StatisticDefinition>>,
    values: RwLock<Vec<StatisticValue>>,
}

impl MemoryStatisticStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(
        definitions: impl IntoIterator<Item = StatisticDefinition>,
        values: impl IntoIterator<Item = StatisticValue>,
    ) -> Self {
        Self {
            definitions: RwLock::new(definitions.into_iter().map(|d| (d.id, d)).collect()),
            values: RwLock::new(values.into_iter().collect()),
        }
    }

    pub fn put_definition(&self, definition: StatisticDefinition) -> Result<()> {
        let mut defs = self.definitions.write().map_err(|e| anyhow!("Lock: {}", e))?;
        defs.insert(definition.id, definition);
        Ok(())
    }

    pub fn put_values(&self, values: impl IntoIterator<Item = StatisticValue>) -> Result<()> {
        let mut stored = self.values.write().map_err(|e| anyhow!("Lock: {}", e))?;
        stored.extend(values);
        Ok(())
    }
}

#[async_trait]
impl StatisticStore for MemoryStatisticStore {
    async fn fetch_values(
        &self,
        statistic_id: i64,
        entities: &[EntityReference],
    ) -> Result<Vec<StatisticValue>> {
        let wanted: HashSet<&EntityReference> = entities.iter().collect();
        let values = self.values.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(values
            .iter()
            .filter(|v| v.statistic_id == statistic_id && wanted.contains(&v.entity))
            .cloned()
            .collect())
    }

    async fn fetch_definition(&self, statistic_id: i64) -> Result<Option<StatisticDefinition>> {
        let defs = self.definitions.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(defs.get(&statistic_id).cloned())
    }

    async fn fetch_definitions(&self, active_only: bool) -> Result<Vec<StatisticDefinition>> {
        let defs = self.definitions.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(defs
            .values()
            .filter(|d| !active_only || d.active)
            .cloned()
            .collect())
    }
}

/// In-memory HierarchySource; edges can be replaced between refreshes.
#[derive(Default)]
pub struct MemoryHierarchySource {
    edges: RwLock<Vec<HierarchyEdge>>,
}

impl MemoryHierarchySource {
    pub fn new(edges: Vec<HierarchyEdge>) -> Self {
        Self {
            edges: RwLock::new(edges),
        }
    }

    pub fn replace(&self, edges: Vec<HierarchyEdge>) -> Result<()> {
        let mut current = self.edges.write().map_err(|e| anyhow!("Lock: {}", e))?;
        *current = edges;
        Ok(())
    }
}

#[async_trait]
impl HierarchySource for MemoryHierarchySource {
    async fn fetch_edges(&self) -> Result<Vec<HierarchyEdge>> {
        let edges = self.edges.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(edges.clone())
    }
}
