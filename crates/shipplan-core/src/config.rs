//! Optimizer configuration that callers can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Parallelism for nodes that do not declare one.
    pub default_parallelism: u32,

    /// Output size assumed for sources without an estimate.
    pub default_source_bytes: u64,

    /// Fixed cost added for every local sort a channel needs.
    pub local_sort_penalty: u64,

    /// Upper bound on surviving candidates per plan node after pruning.
    pub max_candidates_per_node: usize,

    /// When false, size estimates attached to the logical plan are ignored
    /// and every source is assumed to produce `default_source_bytes`.
    pub use_size_estimates: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            default_parallelism: 4,
            default_source_bytes: 64 * 1024 * 1024, // 64 MiB
            local_sort_penalty: 1024 * 1024,
            max_candidates_per_node: 8,
            use_size_estimates: true,
        }
    }
}

impl OptimizerConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `SHIPPLAN_DEFAULT_PARALLELISM`
    /// - `SHIPPLAN_DEFAULT_SOURCE_BYTES`
    /// - `SHIPPLAN_LOCAL_SORT_PENALTY`
    /// - `SHIPPLAN_MAX_CANDIDATES`
    /// - `SHIPPLAN_USE_SIZE_ESTIMATES` (`true`/`false`)
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("SHIPPLAN_DEFAULT_PARALLELISM") {
            if let Ok(v) = s.parse::<u32>() {
                cfg.default_parallelism = v;
            }
        }

        if let Ok(s) = std::env::var("SHIPPLAN_DEFAULT_SOURCE_BYTES") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.default_source_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("SHIPPLAN_LOCAL_SORT_PENALTY") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.local_sort_penalty = v;
            }
        }

        if let Ok(s) = std::env::var("SHIPPLAN_MAX_CANDIDATES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_candidates_per_node = v;
            }
        }

        if let Ok(s) = std::env::var("SHIPPLAN_USE_SIZE_ESTIMATES") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.use_size_estimates = v;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_parallelism == 0 {
            return Err(Error::Config("default_parallelism must be positive".into()));
        }
        if self.max_candidates_per_node == 0 {
            return Err(Error::Config(
                "max_candidates_per_node must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Same settings, but size estimates from the plan are ignored.
    pub fn without_size_estimates(mut self) -> Self {
        self.use_size_estimates = false;
        self
    }
}
