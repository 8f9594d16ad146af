//! Service configuration parsing
//!
//! Loads rollup, fetch and refresh settings from YAML. Every field has a
//! default, so an empty document is a valid configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::rollup::{RollupSettings, DEFAULT_MISSING_LABEL};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatsConfig {
    pub rollup: RollupConfig,
    pub fetch: FetchConfig,
    pub refresh: RefreshConfig,
}

/// Null-counting behaviour of the rollup engine
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RollupConfig {
    pub count_missing: bool,
    pub missing_label: String,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            count_missing: false,
            missing_label: DEFAULT_MISSING_LABEL.to_string(),
        }
    }
}

/// Bounds on the value-store fetch phase
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// Default timeout for one call's fetch phase; `None` disables it.
    pub timeout_ms: Option<u64>,
    /// Concurrent fetches when tallying several statistics at once.
    pub max_concurrent: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Some(5_000),
            max_concurrent: 4,
        }
    }
}

/// Hierarchy refresh cadence
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl StatsConfig {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("Failed to parse entity statistics config")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn rollup_settings(&self) -> RollupSettings {
        RollupSettings {
            count_missing: self.rollup.count_missing,
            missing_label: self.rollup.missing_label.clone(),
        }
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch.timeout_ms.map(Duration::from_millis)
    }

    pub fn max_concurrent_fetches(&self) -> usize {
        self.fetch.max_concurrent.max(1)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_secs.max(1))
    }
}
