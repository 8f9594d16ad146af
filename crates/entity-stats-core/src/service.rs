//! EntityStatisticService - the operations exposed to the transport layer.
//!
//! Takes its collaborators via `Arc<dyn …>` so the same logic works against
//! the in-memory adapters or a real persistence layer. Every call resolves
//! its selection against one hierarchy snapshot, performs a single fetch
//! phase (bounded by an optional timeout), and only then rolls up. A timed
//! out fetch returns `StatsError::Timeout` and no partial results.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument, warn};

use crate::config::StatsConfig;
use crate::error::{Result, StatsError};
use crate::hierarchy::HierarchyIndex;
use crate::rollup::RollupEngine;
use crate::selection::SelectionResolver;
use crate::store::StatisticStore;
use crate::types::*;

pub struct EntityStatisticService {
    store: Arc<dyn StatisticStore>,
    hierarchy: Arc<HierarchyIndex>,
    engine: RollupEngine,
    fetch_timeout: Option<Duration>,
    max_concurrent: usize,
}

impl EntityStatisticService {
    pub fn new(
        store: Arc<dyn StatisticStore>,
        hierarchy: Arc<HierarchyIndex>,
        config: &StatsConfig,
    ) -> Self {
        Self {
            store,
            hierarchy,
            engine: RollupEngine::new(config.rollup_settings()),
            fetch_timeout: config.fetch_timeout(),
            max_concurrent: config.max_concurrent_fetches(),
        }
    }

    pub fn hierarchy(&self) -> &Arc<HierarchyIndex> {
        &self.hierarchy
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.fetch_timeout
    }

    // ── Definitions ───────────────────────────────────────────────

    pub async fn find_all_active_definitions(&self) -> Result<Vec<StatisticDefinition>> {
        self.store.fetch_definitions(true).await
    }

    pub async fn get_definition_by_id(&self, statistic_id: i64) -> Result<StatisticDefinition> {
        self.store
            .fetch_definition(statistic_id)
            .await?
            .ok_or_else(|| not_found(statistic_id))
    }

    /// The definition with its parent and its active children.
    #[instrument(skip(self))]
    pub async fn find_related_stat_definitions(
        &self,
        statistic_id: i64,
    ) -> Result<ImmediateHierarchy<StatisticDefinition>> {
        let definition = self.get_definition_by_id(statistic_id).await?;
        let parent = match definition.parent_id {
            Some(parent_id) => self.store.fetch_definition(parent_id).await?,
            None => None,
        };
        let children = self
            .store
            .fetch_definitions(true)
            .await?
            .into_iter()
            .filter(|d| d.parent_id == Some(statistic_id) && d.id != statistic_id)
            .collect();
        Ok(ImmediateHierarchy {
            self_: definition,
            parent,
            children,
        })
    }

    // ── Values ────────────────────────────────────────────────────

    /// Raw values recorded against the selected members, sorted by entity.
    #[instrument(skip(self))]
    pub async fn get_statistic_values_for_app_id_selector(
        &self,
        statistic_id: i64,
        options: &IdSelectionOptions,
    ) -> Result<Vec<StatisticValue>> {
        let snapshot = self.hierarchy.snapshot();
        let scope = SelectionResolver::new(&snapshot).resolve_scope(options)?;
        let mut values = self
            .within(
                self.fetch_timeout,
                self.store.fetch_values(statistic_id, &scope.members),
            )
            .await?;
        values.sort_by(|a, b| {
            a.entity
                .cmp(&b.entity)
                .then_with(|| a.value.cmp(&b.value))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(values)
    }

    // ── Tallies ───────────────────────────────────────────────────

    /// Per-node tallies for one statistic, with the rollup kind given as
    /// caller input. Unknown kinds are rejected before any fetch.
    pub async fn calculate_stat_tally(
        &self,
        statistic_id: i64,
        rollup_kind: &str,
        options: &IdSelectionOptions,
    ) -> Result<Vec<TallyPack<String>>> {
        self.calculate_stat_tally_within(statistic_id, rollup_kind, options, self.fetch_timeout)
            .await
    }

    pub async fn calculate_stat_tally_within(
        &self,
        statistic_id: i64,
        rollup_kind: &str,
        options: &IdSelectionOptions,
        timeout: Option<Duration>,
    ) -> Result<Vec<TallyPack<String>>> {
        let kind: RollupKind = rollup_kind.parse()?;
        self.calculate_tally(statistic_id, kind, options, timeout)
            .await
    }

    #[instrument(skip(self))]
    pub async fn calculate_tally(
        &self,
        statistic_id: i64,
        kind: RollupKind,
        options: &IdSelectionOptions,
        timeout: Option<Duration>,
    ) -> Result<Vec<TallyPack<String>>> {
        options.validate()?;
        let snapshot = self.hierarchy.snapshot();
        let scope = SelectionResolver::new(&snapshot).resolve_scope(options)?;

        let values = self
            .within(timeout, async {
                self.get_definition_by_id(statistic_id).await?;
                if kind == RollupKind::None {
                    return Ok(Vec::new());
                }
                self.store.fetch_values(statistic_id, &scope.members).await
            })
            .await?;

        let packs = self.engine.roll_up(&snapshot, &scope, &values, kind);
        info!(
            statistic_id,
            %kind,
            generation = snapshot.generation(),
            values = values.len(),
            packs = packs.len(),
            "calculated statistic tally"
        );
        Ok(packs)
    }

    /// One selection-wide pack per known statistic, each rolled up with its
    /// definition's default kind. Unknown ids are skipped.
    pub async fn find_stat_tallies(
        &self,
        statistic_ids: &[i64],
        selector: &IdSelectionOptions,
    ) -> Result<Vec<TallyPack<String>>> {
        self.find_stat_tallies_within(statistic_ids, selector, self.fetch_timeout)
            .await
    }

    #[instrument(skip(self))]
    pub async fn find_stat_tallies_within(
        &self,
        statistic_ids: &[i64],
        selector: &IdSelectionOptions,
        timeout: Option<Duration>,
    ) -> Result<Vec<TallyPack<String>>> {
        let snapshot = self.hierarchy.snapshot();
        let scope = SelectionResolver::new(&snapshot).resolve_scope(selector)?;

        let mut ids = statistic_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let members = scope.members.as_slice();
        let fetches = stream::iter(ids)
            .map(|id| self.fetch_statistic(id, members))
            .buffered(self.max_concurrent)
            .try_collect::<Vec<_>>();
        let fetched = self.within(timeout, fetches).await?;

        let packs: Vec<TallyPack<String>> = fetched
            .into_iter()
            .flatten()
            .map(|(definition, values)| {
                let subject = EntityReference::new(EntityKind::EntityStatistic, definition.id);
                self.engine
                    .roll_up_selection(subject, &scope, &values, definition.rollup_kind)
            })
            .collect();
        debug!(
            requested = statistic_ids.len(),
            packs = packs.len(),
            members = scope.members.len(),
            "found statistic tallies"
        );
        Ok(packs)
    }

    async fn fetch_statistic(
        &self,
        statistic_id: i64,
        members: &[EntityReference],
    ) -> Result<Option<(StatisticDefinition, Vec<StatisticValue>)>> {
        let Some(definition) = self.store.fetch_definition(statistic_id).await? else {
            debug!(statistic_id, "skipping unknown statistic");
            return Ok(None);
        };
        let values = match definition.rollup_kind {
            RollupKind::None => Vec::new(),
            _ => self.store.fetch_values(statistic_id, members).await?,
        };
        Ok(Some((definition, values)))
    }

    async fn within<T, F>(&self, timeout: Option<Duration>, fetch: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "statistic fetch timed out");
                    Err(StatsError::Timeout(limit))
                }
            },
            None => fetch.await,
        }
    }
}

fn not_found(statistic_id: i64) -> StatsError {
    StatsError::NotFound(format!("statistic definition {statistic_id}"))
}
