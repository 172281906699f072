// src/sink.rs
//! Delivery sinks for finished runs. Storage and delivery live outside the core; the
//! pipeline only hands each `RunOutput` to whatever sinks are registered.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::pipeline::RunOutput;

#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, output: &RunOutput) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Writes `<dir>/<vertical>-<UTC timestamp>.json`, atomically (tmp + rename).
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, output: &RunOutput) -> PathBuf {
        let stamp = output.selection.generated_at().format("%Y%m%dT%H%M%SZ");
        self.dir
            .join(format!("{}-{stamp}.json", output.selection.vertical()))
    }
}

#[async_trait]
impl DeliverySink for JsonFileSink {
    async fn deliver(&self, output: &RunOutput) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path_for(output);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(output)?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::info!(target: "sink", path = %path.display(), "run written");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json_file"
    }
}

/// Keeps the most recent runs in memory (API "latest run", tests).
pub struct MemorySink {
    runs: Mutex<Vec<RunOutput>>,
    cap: usize,
}

impl MemorySink {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            cap: cap.max(1),
        }
    }

    pub fn latest(&self) -> Option<RunOutput> {
        self.runs.lock().ok().and_then(|g| g.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.runs.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::with_capacity(20)
    }
}

#[async_trait]
impl DeliverySink for MemorySink {
    async fn deliver(&self, output: &RunOutput) -> Result<()> {
        let mut g = self
            .runs
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink poisoned"))?;
        g.push(output.clone());
        if g.len() > self.cap {
            let excess = g.len() - self.cap;
            g.drain(0..excess);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
