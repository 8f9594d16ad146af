//! YAML dataset fixtures
//!
//! A dataset bundles statistic definitions, hierarchy edges and recorded
//! values in one document, and wires them into the in-memory store so a
//! full `EntityStatisticService` can run without a database.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use entity_stats_core::{
    EntityStatisticService, HierarchyEdge, HierarchyIndex, MemoryStatisticStore,
    StatisticDefinition, StatisticValue, StatsConfig, StatsError,
};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse dataset: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("duplicate statistic definition id {0}")]
    DuplicateDefinition(i64),

    #[error("invalid hierarchy: {0}")]
    Hierarchy(#[from] StatsError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub definitions: Vec<StatisticDefinition>,
    pub hierarchy: Vec<HierarchyEdge>,
    pub values: Vec<StatisticValue>,
}

impl Dataset {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DatasetError> {
        let dataset: Self = serde_yaml::from_str(yaml)?;
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    fn validate(&self) -> Result<(), DatasetError> {
        let mut ids = HashSet::new();
        for def in &self.definitions {
            if !ids.insert(def.id) {
                return Err(DatasetError::DuplicateDefinition(def.id));
            }
        }
        let orphaned = self
            .values
            .iter()
            .filter(|v| !ids.contains(&v.statistic_id))
            .count();
        if orphaned > 0 {
            tracing::warn!(orphaned, "values recorded against undefined statistics");
        }
        Ok(())
    }

    /// Build a ready-to-query service over this dataset.
    pub fn into_service(self, config: &StatsConfig) -> Result<EntityStatisticService, DatasetError> {
        let hierarchy = HierarchyIndex::from_edges(self.hierarchy.iter().copied())?;
        tracing::info!(
            definitions = self.definitions.len(),
            nodes = hierarchy.snapshot().len(),
            values = self.values.len(),
            "dataset loaded"
        );
        let store = MemoryStatisticStore::with_data(self.definitions, self.values);
        Ok(EntityStatisticService::new(
            Arc::new(store),
            Arc::new(hierarchy),
            config,
        ))
    }
}
