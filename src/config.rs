use anyhow::{Context, Result};
use record_sift_core::engine::SearchOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::batch::BatchOptions;
use crate::rate_limit::{RateLimitConfig, RateLimitPreset};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchOptions,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

fn default_history_path() -> PathBuf {
    PathBuf::from("./data/history.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_data_path")]
    pub path: PathBuf,
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            id_field: default_id_field(),
        }
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("./data/records.json")
}
fn default_id_field() -> String {
    "id".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_delay_between_batches_ms")]
    pub delay_between_batches_ms: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub stop_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            delay_between_batches_ms: default_delay_between_batches_ms(),
            max_retries: 0,
            stop_on_error: false,
        }
    }
}

fn default_batch_size() -> usize {
    10
}
fn default_delay_between_batches_ms() -> u64 {
    100
}

impl BatchConfig {
    /// Runner options for this section; callbacks are attached by the caller.
    pub fn options(&self) -> BatchOptions {
        BatchOptions::new()
            .batch_size(self.batch_size)
            .delay_between_batches(std::time::Duration::from_millis(
                self.delay_between_batches_ms,
            ))
            .max_retries(self.max_retries)
            .stop_on_error(self.stop_on_error)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RateLimitSection {
    #[serde(default)]
    pub preset: RateLimitPreset,
    #[serde(default)]
    pub window_ms: Option<u64>,
    #[serde(default)]
    pub max_requests: Option<u32>,
}

impl RateLimitSection {
    /// The preset's limits with any explicit overrides applied.
    pub fn limits(&self) -> RateLimitConfig {
        let mut limits = self.preset.config();
        if let Some(window_ms) = self.window_ms {
            limits.window_ms = window_ms;
        }
        if let Some(max_requests) = self.max_requests {
            limits.max_requests = max_requests;
        }
        limits
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate search
    if config.search.max_history_items == 0 {
        anyhow::bail!("search.max_history_items must be >= 1");
    }
    if config.search.history_key.trim().is_empty() {
        anyhow::bail!("search.history_key must not be empty");
    }
    if config.search.highlight.open.is_empty() {
        anyhow::bail!("search.highlight.open must not be empty");
    }

    // Validate data
    if config.data.id_field.trim().is_empty() {
        anyhow::bail!("data.id_field must not be empty");
    }

    // Validate batch
    if config.batch.batch_size == 0 {
        anyhow::bail!("batch.batch_size must be >= 1");
    }

    // Validate rate limit overrides
    if config.rate_limit.window_ms == Some(0) {
        anyhow::bail!("rate_limit.window_ms must be >= 1");
    }
    if config.rate_limit.max_requests == Some(0) {
        anyhow::bail!("rate_limit.max_requests must be >= 1");
    }

    Ok(config)
}
