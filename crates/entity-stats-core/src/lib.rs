//! Entity statistics core - selection resolution and hierarchical rollups.
//!
//! Turns an abstract selection ("everything under this org unit") into a
//! concrete entity set, fetches the raw statistic values recorded against
//! that set, and aggregates them into per-node tallies.
//!
//! ```text
//! IdSelectionOptions ──► SelectionResolver ──► StatisticStore::fetch_values
//!                              │                         │
//!                              ▼                         ▼
//!                      HierarchySnapshot ──────►  RollupEngine ──► TallyPack
//! ```
//!
//! Pure domain logic: storage and the hierarchy source sit behind the port
//! traits in [`store`], with in-memory adapters in [`memory`].

pub mod assemble;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod memory;
pub mod refresh;
pub mod rollup;
pub mod selection;
pub mod service;
pub mod store;
pub mod types;

pub use config::StatsConfig;
pub use error::{Result, StatsError};
pub use hierarchy::{HierarchyIndex, HierarchySnapshot, NodeIdx};
pub use memory::{MemoryHierarchySource, MemoryStatisticStore};
pub use refresh::{refresh_once, run_refresh_loop};
pub use rollup::{NodeTally, RollupEngine, RollupSettings};
pub use selection::{ResolvedScope, SelectionResolver};
pub use service::EntityStatisticService;
pub use store::{HierarchySource, StatisticStore};
pub use types::*;
