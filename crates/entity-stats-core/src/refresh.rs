//! Hierarchy refresh pipeline (HierarchySource -> HierarchyIndex)

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::hierarchy::HierarchyIndex;
use crate::store::HierarchySource;

/// Pull the current edge list and swap in a fresh snapshot.
/// Returns the new generation.
pub async fn refresh_once(index: &HierarchyIndex, source: &dyn HierarchySource) -> Result<u64> {
    let edges = source.fetch_edges().await?;
    tracing::debug!(edges = edges.len(), "fetched hierarchy edges");
    index.refresh(edges)
}

/// Refresh `index` from `source` every `interval`, forever.
///
/// A failed refresh is logged and the previous snapshot keeps serving.
pub async fn run_refresh_loop(
    index: Arc<HierarchyIndex>,
    source: Arc<dyn HierarchySource>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; callers refresh at startup themselves.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match refresh_once(&index, source.as_ref()).await {
            Ok(generation) => tracing::debug!(generation, "hierarchy refresh complete"),
            Err(e) => tracing::error!(error = %e, "hierarchy refresh failed"),
        }
    }
}
