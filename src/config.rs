//! Application configuration
//!
//! One YAML file covering storage paths, worker count and every
//! policy knob of the engine and its stores. Missing file means
//! defaults; a handful of `SITEPILOT_*` environment variables override
//! the file for container deployments.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use failure_heatmap::HeatmapPolicy;
use interaction_engine::{EngineConfig, DEFAULT_POOL_SIZE};
use selector_memory::StorePolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding knowledge.json and heatmap.json
    pub storage_root: PathBuf,

    /// Engine pool size
    pub workers: usize,

    /// Discovery usability floor
    pub discovery_usability_floor: f64,

    /// Periodic background flush cadence, seconds. Persistence is
    /// write-through anyway; the flush catches anything a crashed
    /// write missed.
    pub flush_interval_secs: u64,

    /// Retry budgets and per-step deadlines
    pub engine: EngineConfig,

    /// Confidence update policy
    pub store: StorePolicy,

    /// Failure heatmap policy
    pub heatmap: HeatmapPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            workers: DEFAULT_POOL_SIZE,
            discovery_usability_floor: 0.35,
            flush_interval_secs: 30,
            engine: EngineConfig::default(),
            store: StorePolicy::default(),
            heatmap: HeatmapPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load from a YAML file, falling back to defaults when the path
    /// is absent, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path)?;
                debug!(path = %path.display(), "loaded config file");
                serde_yaml::from_str(&raw)?
            }
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(root) = env_var("SITEPILOT_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(root);
        }
        if let Some(workers) = env_var("SITEPILOT_WORKERS").and_then(|v| v.parse().ok()) {
            self.workers = workers;
        }
    }

    pub fn knowledge_path(&self) -> PathBuf {
        self.storage_root.join("knowledge.json")
    }

    pub fn heatmap_path(&self) -> PathBuf {
        self.storage_root.join("heatmap.json")
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn env_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("sitepilot"))
        .unwrap_or_else(|| PathBuf::from("sitepilot-data"))
}
