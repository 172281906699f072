//! history.rs: bounded per-subject series of view totals (momentum/velocity input).
//!
//! One snapshot per run; the scorer reads the last `HISTORY_WINDOW` points
//! (oldest first) and treats the newest stored point as "views 6h ago".

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Points kept per subject.
pub const HISTORY_WINDOW: usize = 5;
/// Subjects without a snapshot for this many runs are forgotten.
pub const MAX_IDLE_RUNS: u64 = 30;

/// Time-series source for the scorer. Owned outside the core; the pipeline only
/// reads a bounded window and appends one snapshot per run.
pub trait HistoryStore: Send + Sync {
    fn window(&self, subject_key: &str) -> Vec<f64>;
    /// Append one snapshot per subject, as a single write.
    fn record(&self, snapshots: &[(String, f64)]) -> Result<()>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Series {
    points: VecDeque<f64>,
    /// Run number of the latest snapshot.
    last_run: u64,
}

/// On-disk and in-memory layout.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct State {
    /// Completed `record` calls.
    run: u64,
    subjects: BTreeMap<String, Series>,
}

#[derive(Debug)]
pub struct TrendHistory {
    inner: Mutex<State>,
    cap: usize,
    max_idle_runs: u64,
    path: Option<PathBuf>,
}

impl Default for TrendHistory {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl TrendHistory {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(State::default()),
            cap: HISTORY_WINDOW,
            max_idle_runs: MAX_IDLE_RUNS,
            path: None,
        }
    }

    /// JSON-backed store; a missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state: State = if path.exists() {
            let s = fs::read_to_string(&path)
                .with_context(|| format!("reading history {}", path.display()))?;
            serde_json::from_str(&s).with_context(|| format!("parsing history {}", path.display()))?
        } else {
            State::default()
        };
        Ok(Self {
            inner: Mutex::new(state),
            cap: HISTORY_WINDOW,
            max_idle_runs: MAX_IDLE_RUNS,
            path: Some(path),
        })
    }

    /// Override how many runs a subject may go without a snapshot.
    pub fn with_max_idle_runs(mut self, runs: u64) -> Self {
        self.max_idle_runs = runs.max(1);
        self
    }

    /// Subjects currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.subjects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seed a subject's series (tests, backfills). Keeps the last `cap` points.
    pub fn seed(&self, subject_key: &str, points: &[f64]) {
        if let Ok(mut g) = self.inner.lock() {
            let run = g.run;
            let series = g.subjects.entry(subject_key.to_string()).or_default();
            series.points.extend(points.iter().copied().filter(|p| p.is_finite() && *p >= 0.0));
            while series.points.len() > self.cap {
                series.points.pop_front();
            }
            series.last_run = run;
        }
    }

    fn persist(&self, state: &State) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(serde_json::to_string(state)?.as_bytes())?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

impl HistoryStore for TrendHistory {
    fn window(&self, subject_key: &str) -> Vec<f64> {
        self.inner
            .lock()
            .ok()
            .and_then(|g| {
                g.subjects
                    .get(subject_key)
                    .map(|s| s.points.iter().copied().collect())
            })
            .unwrap_or_default()
    }

    fn record(&self, snapshots: &[(String, f64)]) -> Result<()> {
        let mut g = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("history mutex poisoned"))?;
        g.run = g.run.saturating_add(1);
        let run = g.run;
        for (key, views) in snapshots {
            if !views.is_finite() || *views < 0.0 {
                continue;
            }
            let series = g.subjects.entry(key.clone()).or_default();
            series.points.push_back(*views);
            while series.points.len() > self.cap {
                series.points.pop_front();
            }
            series.last_run = run;
        }

        let before = g.subjects.len();
        let max_idle = self.max_idle_runs;
        g.subjects.retain(|_, s| run - s.last_run.min(run) < max_idle);
        let pruned = before - g.subjects.len();
        if pruned > 0 {
            tracing::debug!(target: "pipeline", pruned, "idle history subjects dropped");
        }
        self.persist(&g)
    }
}
