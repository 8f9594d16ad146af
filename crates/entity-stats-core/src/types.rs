//! Core domain types for entity statistics.
//! These are pure value types - no storage, no transport dependencies.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

// ── Entity references ─────────────────────────────────────────

/// Kind of entity a reference points at.
///
/// Variants are declared in byte order of their wire names so that the
/// derived `Ord` matches "sort by kind name" (`APPLICATION` < `APP_GROUP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Application,
    AppGroup,
    EntityStatistic,
    Measurable,
    OrgUnit,
    Person,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "APPLICATION",
            Self::AppGroup => "APP_GROUP",
            Self::EntityStatistic => "ENTITY_STATISTIC",
            Self::Measurable => "MEASURABLE",
            Self::OrgUnit => "ORG_UNIT",
            Self::Person => "PERSON",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPLICATION" => Ok(Self::Application),
            "APP_GROUP" => Ok(Self::AppGroup),
            "ENTITY_STATISTIC" => Ok(Self::EntityStatistic),
            "MEASURABLE" => Ok(Self::Measurable),
            "ORG_UNIT" => Ok(Self::OrgUnit),
            "PERSON" => Ok(Self::Person),
            _ => Err(StatsError::Validation(format!(
                "entity kind cannot be [{s}]"
            ))),
        }
    }
}

/// Immutable (kind, id) key. Ordered by kind, then id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityReference {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityReference {
    pub const fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub const fn application(id: i64) -> Self {
        Self::new(EntityKind::Application, id)
    }

    pub const fn org_unit(id: i64) -> Self {
        Self::new(EntityKind::OrgUnit, id)
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A single parent → child link in the entity hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub parent: EntityReference,
    pub child: EntityReference,
}

impl HierarchyEdge {
    pub const fn new(parent: EntityReference, child: EntityReference) -> Self {
        Self { parent, child }
    }
}

// ── Rollup kinds ──────────────────────────────────────────────

/// Aggregation strategy applied when combining descendant values into a
/// node-level tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollupKind {
    /// Count members under each node grouped by raw value.
    #[serde(alias = "COUNT_BY_ENTITY")]
    CountDistinctValues,
    /// Each node's own values, no aggregation across the hierarchy.
    Exact,
    /// Statistic is not rolled up; no tallies are produced.
    None,
}

impl RollupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CountDistinctValues => "COUNT_DISTINCT_VALUES",
            Self::Exact => "EXACT",
            Self::None => "NONE",
        }
    }
}

impl fmt::Display for RollupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollupKind {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COUNT_DISTINCT_VALUES" | "COUNT_BY_ENTITY" => Ok(Self::CountDistinctValues),
            "EXACT" => Ok(Self::Exact),
            "NONE" => Ok(Self::None),
            _ => Err(StatsError::Validation(format!(
                "rollupKind cannot be [{s}]"
            ))),
        }
    }
}

// ── Selection options ─────────────────────────────────────────

/// Traversal direction applied to the selection scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HierarchyQueryScope {
    Exact,
    Children,
    Parents,
}

impl HierarchyQueryScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "EXACT",
            Self::Children => "CHILDREN",
            Self::Parents => "PARENTS",
        }
    }
}

impl FromStr for HierarchyQueryScope {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EXACT" => Ok(Self::Exact),
            "CHILDREN" => Ok(Self::Children),
            "PARENTS" => Ok(Self::Parents),
            _ => Err(StatsError::Validation(format!(
                "scope direction cannot be [{s}]"
            ))),
        }
    }
}

/// Request-scoped description of which entities a query applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdSelectionOptions {
    pub scope: EntityReference,
    pub scope_direction: HierarchyQueryScope,
    /// Restricts the counted members to one entity kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_kind: Option<EntityKind>,
}

impl IdSelectionOptions {
    pub fn new(scope: EntityReference, scope_direction: HierarchyQueryScope) -> Self {
        Self {
            scope,
            scope_direction,
            entity_kind: None,
        }
    }

    pub fn with_entity_kind(mut self, kind: EntityKind) -> Self {
        self.entity_kind = Some(kind);
        self
    }

    pub fn validate(&self) -> Result<(), StatsError> {
        if self.scope.id <= 0 {
            return Err(StatsError::Validation(format!(
                "selection scope id must be positive, got {}",
                self.scope
            )));
        }
        Ok(())
    }
}

// ── Definitions and values ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatisticCategory {
    Compliance,
    Governance,
    Regulatory,
    Security,
    Service,
    Technical,
}

/// Administrator-managed statistic definition. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticDefinition {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: StatisticCategory,
    pub rollup_kind: RollupKind,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Parent statistic for "related" definition hierarchies.
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub provenance: Option<String>,
}

fn default_active() -> bool {
    true
}

/// A recorded statistic value for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticValue {
    pub entity: EntityReference,
    pub statistic_id: i64,
    /// Raw value; `None` when the row was recorded without one.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Only current rows participate in tallies.
    #[serde(default = "default_active")]
    pub current: bool,
    #[serde(default)]
    pub provenance: Option<String>,
}

/// A definition together with its direct parent and children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmediateHierarchy<T> {
    #[serde(rename = "self")]
    pub self_: T,
    pub parent: Option<T>,
    pub children: Vec<T>,
}

// ── Tallies ───────────────────────────────────────────────────

/// Number of entities sharing one value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tally<T> {
    pub id: T,
    pub count: u64,
}

pub type StringTally = Tally<String>;

/// The tallies computed for one entity reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyPack<T> {
    pub entity_reference: EntityReference,
    pub tallies: Vec<Tally<T>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> TallyPack<T> {
    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }
}

impl TallyPack<String> {
    /// Count recorded for `value`, zero when absent.
    pub fn count_of(&self, value: &str) -> u64 {
        self.tallies
            .iter()
            .find(|t| t.id == value)
            .map(|t| t.count)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.tallies.iter().map(|t| t.count).sum()
    }
}
