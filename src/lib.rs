//! Entity Statistics - tallies and hierarchical rollups of entity statistics
//!
//! Application crate around `entity-stats-core`: configuration and dataset
//! loading, logging setup, and the `stat_tally` command-line tool.
//!
//! # Usage
//!
//! ```ignore
//! use entity_stats::{dataset::Dataset, StatsConfig};
//!
//! let config = StatsConfig::from_file("config/entity_stats.yaml")?;
//! let dataset = Dataset::from_file("config/sample_dataset.yaml")?;
//! let service = dataset.into_service(&config)?;
//!
//! let packs = service
//!     .calculate_stat_tally(1, "COUNT_DISTINCT_VALUES", &options)
//!     .await?;
//! ```

pub mod dataset;
pub mod telemetry;

pub use entity_stats_core as core;
pub use entity_stats_core::{
    EntityStatisticService, HierarchyIndex, StatsConfig, StatsError, TallyPack,
};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "ENTITY_STATS_CONFIG";

/// Default configuration path
pub const DEFAULT_CONFIG_PATH: &str = "config/entity_stats.yaml";

/// Load configuration from `path`, else `$ENTITY_STATS_CONFIG`, else the
/// default path. A missing default file yields the built-in defaults; an
/// explicitly named file must exist.
pub fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<StatsConfig> {
    if let Some(path) = path {
        return StatsConfig::from_file(path);
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return StatsConfig::from_file(path);
    }
    let default = std::path::Path::new(DEFAULT_CONFIG_PATH);
    if default.exists() {
        StatsConfig::from_file(default)
    } else {
        tracing::debug!("no config file found, using defaults");
        Ok(StatsConfig::default())
    }
}
