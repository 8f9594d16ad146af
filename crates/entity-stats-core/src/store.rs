//! Port traits for the collaborators this crate reads from.
//!
//! The engine and service operate exclusively through these traits, so the
//! same logic runs against the in-memory adapters (tests, CLI) or a real
//! persistence layer.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EntityReference, HierarchyEdge, StatisticDefinition, StatisticValue};

/// Read access to statistic definitions and recorded values.
#[async_trait]
pub trait StatisticStore: Send + Sync {
    /// Values of `statistic_id` recorded against any of `entities`.
    async fn fetch_values(
        &self,
        statistic_id: i64,
        entities: &[EntityReference],
    ) -> Result<Vec<StatisticValue>>;

    async fn fetch_definition(&self, statistic_id: i64) -> Result<Option<StatisticDefinition>>;

    async fn fetch_definitions(&self, active_only: bool) -> Result<Vec<StatisticDefinition>>;
}

/// Bulk source of the entity hierarchy, used to (re)build the index.
#[async_trait]
pub trait HierarchySource: Send + Sync {
    async fn fetch_edges(&self) -> Result<Vec<HierarchyEdge>>;
}
