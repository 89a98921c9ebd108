//! Pipeline Driver configuration.
//!
//! Load order: `graphcfg.toml` in the project root -> environment variable
//! overrides -> defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Worker count, per-vertex timeout, and failure-handling mode for a
/// pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bounded concurrency: at most this many vertices render at once.
    pub workers: usize,
    /// Per-vertex `Prepare` timeout, in milliseconds.
    pub prepare_timeout_ms: u64,
    /// Halt on the first `Prepare` error (default) or mark the vertex
    /// `Failed` and skip its transitive dependents.
    pub best_effort: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            prepare_timeout_ms: 30_000,
            best_effort: false,
        }
    }
}

/// Helper to parse an env var and apply it to a config field.
fn env_override<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(parsed) = v.parse()
    {
        *target = parsed;
    }
}

impl PipelineConfig {
    pub fn prepare_timeout(&self) -> Duration {
        Duration::from_millis(self.prepare_timeout_ms)
    }

    /// Load from `graphcfg.toml` in `project_root`, with env var overrides.
    /// Falls back to defaults if no config file exists.
    pub fn load(project_root: &Path) -> anyhow::Result<Self> {
        let config_path = project_root.join("graphcfg.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };

        env_override("GRAPHCFG_WORKERS", &mut config.workers);
        env_override("GRAPHCFG_PREPARE_TIMEOUT_MS", &mut config.prepare_timeout_ms);
        env_override("GRAPHCFG_BEST_EFFORT", &mut config.best_effort);

        if config.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }

        Ok(config)
    }
}
