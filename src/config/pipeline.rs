// src/config/pipeline.rs
//! Run-time knobs for one pipeline invocation.
//!
//! Lookup order: `$PIPELINE_CONFIG_PATH`, `config/pipeline.toml`, built-in defaults.
//! Every field has a default, so a partial file is fine.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PATH: &str = "PIPELINE_CONFIG_PATH";

fn d_adapter_timeout_ms() -> u64 {
    20_000
}
fn d_batch_size() -> usize {
    5
}
fn d_max_retries() -> u32 {
    3
}
fn d_backoff_ms() -> u64 {
    500
}
fn d_annotation_timeout_ms() -> u64 {
    30_000
}
fn d_max_in_flight() -> usize {
    2
}
fn d_idea_timeout_ms() -> u64 {
    30_000
}
fn d_top_n() -> usize {
    3
}
fn d_max_age_hours() -> Option<f64> {
    Some(48.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "d_adapter_timeout_ms")]
    pub adapter_timeout_ms: u64,
    #[serde(default = "d_batch_size")]
    pub annotation_batch_size: usize,
    /// Retries after the first attempt of a batch.
    #[serde(default = "d_max_retries")]
    pub annotation_max_retries: u32,
    /// First backoff; doubles per retry.
    #[serde(default = "d_backoff_ms")]
    pub annotation_backoff_ms: u64,
    #[serde(default = "d_annotation_timeout_ms")]
    pub annotation_timeout_ms: u64,
    /// Cap on simultaneous collaborator calls.
    #[serde(default = "d_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "d_idea_timeout_ms")]
    pub idea_timeout_ms: u64,
    #[serde(default = "d_top_n")]
    pub top_n: usize,
    /// Whole-run deadline; `None` = no deadline.
    #[serde(default)]
    pub run_deadline_ms: Option<u64>,
    /// Items older than this are dropped during normalization.
    #[serde(default = "d_max_age_hours")]
    pub max_age_hours: Option<f64>,
    /// Cross-run dedup cache; `None` keeps dedup within a run.
    #[serde(default)]
    pub seen_cache_path: Option<PathBuf>,
    /// View-count history for velocity and momentum; `None` keeps it in memory.
    #[serde(default)]
    pub history_path: Option<PathBuf>,
    /// Where the JSON sink writes run artifacts.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_ms: d_adapter_timeout_ms(),
            annotation_batch_size: d_batch_size(),
            annotation_max_retries: d_max_retries(),
            annotation_backoff_ms: d_backoff_ms(),
            annotation_timeout_ms: d_annotation_timeout_ms(),
            max_in_flight: d_max_in_flight(),
            idea_timeout_ms: d_idea_timeout_ms(),
            top_n: d_top_n(),
            run_deadline_ms: None,
            max_age_hours: d_max_age_hours(),
            seen_cache_path: None,
            history_path: None,
            output_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Zero sizes would stall the batching and fan-out; clamp them to 1.
    pub fn sanitized(mut self) -> Self {
        self.annotation_batch_size = self.annotation_batch_size.max(1);
        self.max_in_flight = self.max_in_flight.max(1);
        self.top_n = self.top_n.max(1);
        self.adapter_timeout_ms = self.adapter_timeout_ms.max(1);
        self.annotation_timeout_ms = self.annotation_timeout_ms.max(1);
        self.idea_timeout_ms = self.idea_timeout_ms.max(1);
        self.run_deadline_ms = self.run_deadline_ms.filter(|ms| *ms > 0);
        self
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }
    pub fn annotation_timeout(&self) -> Duration {
        Duration::from_millis(self.annotation_timeout_ms)
    }
    pub fn idea_timeout(&self) -> Duration {
        Duration::from_millis(self.idea_timeout_ms)
    }
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.annotation_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        let cfg: PipelineConfig = toml::from_str(&s)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("PIPELINE_CONFIG_PATH points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let toml_p = PathBuf::from("config/pipeline.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        Ok(Self::default())
    }
}
