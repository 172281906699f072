// src/pipeline.rs
//! Run orchestration: collect → seen filter → normalize → annotate → group → score →
//! select → ideas → deliver.
//!
//! Soft failures (one adapter, one annotation batch, one idea) are logged and
//! counted; only configuration errors, a fully failed collection, an empty candidate
//! pool, the run deadline, and caller cancellation abort a run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::analyze::annotate::AnnotatedItem;
use crate::analyze::ideas::{BusinessIdea, IdeaOutcome};
use crate::analyze::scoring::{score_batch, ScoredTrend};
use crate::analyze::select::{select_top, SelectionResult, StageCounts};
use crate::analyze::trends::group_trends;
use crate::analyze::{build_collaborators, Collaborators};
use crate::config::llm::LlmConfig;
use crate::config::pipeline::PipelineConfig;
use crate::error::{AnnotationError, PipelineError};
use crate::history::{HistoryStore, TrendHistory};
use crate::ingest::config::{load_verticals_default, VerticalCatalog, VerticalConfig};
use crate::ingest::normalize::{CanonicalItem, Normalizer};
use crate::ingest::providers::default_adapters;
use crate::ingest::seen::SeenCache;
use crate::ingest::types::{ItemKey, SourceAdapter};
use crate::ingest::{collect_all, SourceReport};
use crate::sink::{DeliverySink, JsonFileSink};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline runs by vertical and outcome.");
        describe_histogram!("pipeline_run_ms", "Wall time of a pipeline run in milliseconds.");
        describe_gauge!("pipeline_last_run_ts", "Unix time of the last successful run.");
        describe_counter!("normalize_duplicates_total", "Records dropped as duplicate keys.");
        describe_counter!(
            "normalize_skipped_total",
            "Records dropped during normalization (missing fields, stale, seen)."
        );
        describe_counter!(
            "annotate_batches_dropped_total",
            "Annotation batches dropped after errors or exhausted retries."
        );
        describe_counter!("annotate_retries_total", "Annotation batch retries.");
        describe_counter!("ideas_placeholder_total", "Selected trends returned with a placeholder idea.");
    });
}

/// What a run hands to the caller and the sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutput {
    pub selection: SelectionResult,
    /// One per selected trend, same order.
    pub ideas: Vec<IdeaOutcome>,
    pub sources: Vec<SourceReport>,
}

impl RunOutput {
    pub fn placeholder_count(&self) -> usize {
        self.ideas.iter().filter(|i| i.placeholder).count()
    }
}

pub struct Pipeline {
    adapters: Vec<Box<dyn SourceAdapter>>,
    collaborators: Collaborators,
    catalog: VerticalCatalog,
    config: PipelineConfig,
    history: Arc<dyn HistoryStore>,
    seen: Option<Arc<SeenCache>>,
    sinks: Vec<Arc<dyn DeliverySink>>,
}

impl Pipeline {
    pub fn new(
        adapters: Vec<Box<dyn SourceAdapter>>,
        collaborators: Collaborators,
        catalog: VerticalCatalog,
        config: PipelineConfig,
    ) -> Self {
        Self {
            adapters,
            collaborators,
            catalog,
            config: config.sanitized(),
            history: Arc::new(TrendHistory::in_memory()),
            seen: None,
            sinks: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    /// Enables cross-run dedup of already delivered posts.
    pub fn with_seen_cache(mut self, seen: Arc<SeenCache>) -> Self {
        self.seen = Some(seen);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Production wiring: five HTTP adapters, collaborators from `config/llm.json`,
    /// file-backed history/seen cache/output when their paths are configured.
    pub fn from_env(config: PipelineConfig) -> anyhow::Result<Self> {
        let catalog = load_verticals_default()?;
        let collaborators = build_collaborators(&LlmConfig::load_default());
        let mut p = Self::new(default_adapters(), collaborators, catalog, config);
        if let Some(path) = p.config.history_path.clone() {
            p = p.with_history(Arc::new(TrendHistory::open(path)?));
        }
        if let Some(path) = p.config.seen_cache_path.clone() {
            p = p.with_seen_cache(Arc::new(SeenCache::open(path)?));
        }
        if let Some(dir) = p.config.output_dir.clone() {
            p = p.with_sink(Arc::new(JsonFileSink::new(dir)));
        }
        Ok(p)
    }

    pub fn catalog(&self) -> &VerticalCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run with the configured top-N and no external cancellation.
    pub async fn run(&self, vertical: &str) -> Result<RunOutput, PipelineError> {
        self.run_with(vertical, None, CancellationToken::new()).await
    }

    /// Run under the configured deadline; `cancel` aborts every in-flight adapter and
    /// collaborator call. Nothing is persisted for an aborted run.
    pub async fn run_with(
        &self,
        vertical: &str,
        top_n: Option<usize>,
        cancel: CancellationToken,
    ) -> Result<RunOutput, PipelineError> {
        ensure_metrics_described();
        let t0 = Instant::now();

        // Unknown vertical: fail before any collection starts.
        let v = match self.catalog.lookup(vertical) {
            Ok(v) => v.clone(),
            Err(e) => {
                counter!("pipeline_runs_total", "vertical" => "unknown", "outcome" => "configuration")
                    .increment(1);
                return Err(e);
            }
        };
        let top_n = top_n.unwrap_or(self.config.top_n).max(1);

        let work = async {
            match self.config.run_deadline_ms {
                Some(ms) => tokio::time::timeout(Duration::from_millis(ms), self.execute(&v, top_n))
                    .await
                    .map_err(|_| PipelineError::DeadlineExceeded(ms))?,
                None => self.execute(&v, top_n).await,
            }
        };
        let res = tokio::select! {
            r = work => r,
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        };

        let outcome = match &res {
            Ok(_) => "ok",
            Err(PipelineError::Configuration(_)) => "configuration",
            Err(PipelineError::AllSourcesFailed { .. }) => "all_sources_failed",
            Err(PipelineError::EmptyResult { .. }) => "empty",
            Err(PipelineError::DeadlineExceeded(_)) => "deadline",
            Err(PipelineError::Cancelled) => "cancelled",
        };
        let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
        counter!("pipeline_runs_total", "vertical" => v.name.clone(), "outcome" => outcome)
            .increment(1);
        histogram!("pipeline_run_ms", "vertical" => v.name.clone()).record(elapsed_ms);
        match &res {
            Ok(out) => {
                gauge!("pipeline_last_run_ts", "vertical" => v.name.clone())
                    .set(Utc::now().timestamp() as f64);
                tracing::info!(
                    target: "pipeline",
                    vertical = %v.name,
                    selected = out.selection.len(),
                    placeholders = out.placeholder_count(),
                    elapsed_ms = elapsed_ms as u64,
                    "run finished"
                );
            }
            Err(e) => {
                tracing::warn!(target: "pipeline", vertical = %v.name, error = %e, "run aborted");
            }
        }
        res
    }

    async fn execute(&self, v: &VerticalConfig, top_n: usize) -> Result<RunOutput, PipelineError> {
        let mut counts = StageCounts::default();

        // 1) Fan-out / fan-in.
        let (raw, sources) =
            collect_all(&self.adapters, &v.keywords, self.config.adapter_timeout()).await;
        if !sources.iter().any(SourceReport::usable) {
            return Err(PipelineError::AllSourcesFailed {
                attempted: self.adapters.len(),
            });
        }
        counts.collected = raw.len();

        // 2) Cross-run dedup.
        let raw = match &self.seen {
            Some(seen) => {
                let (kept, removed) = seen.filter_unseen(raw);
                counts.previously_seen = removed;
                kept
            }
            None => raw,
        };

        // 3) Normalize.
        let report = Normalizer::new(self.config.max_age_hours).normalize(raw);
        counts.deduplicated = report.items.len();
        counts.skipped_missing = report.skipped_missing;
        counts.duplicates = report.duplicates;
        counts.stale = report.stale;
        counter!("normalize_duplicates_total").increment(report.duplicates as u64);
        counter!("normalize_skipped_total", "reason" => "missing")
            .increment(report.skipped_missing as u64);
        counter!("normalize_skipped_total", "reason" => "stale").increment(report.stale as u64);
        counter!("normalize_skipped_total", "reason" => "seen")
            .increment(counts.previously_seen as u64);
        if report.items.is_empty() {
            return Err(PipelineError::EmptyResult {
                stage: "normalization",
            });
        }
        tracing::debug!(
            target: "pipeline",
            items = report.items.len(),
            duplicates = report.duplicates,
            skipped = report.skipped_missing,
            stale = report.stale,
            age_flagged = report.age_flagged,
            "normalized"
        );

        // 4) Annotate in batches.
        let (annotated, dropped) = self.annotate_all(&report.items).await;
        counts.annotation_batches_dropped = dropped;
        counts.annotated = annotated.len();

        // 5) Group into trends.
        let grouping = group_trends(annotated, v);
        counts.rejected = grouping.rejected;
        if grouping.trends.is_empty() {
            return Err(PipelineError::EmptyResult {
                stage: "annotation",
            });
        }

        // 6) Score.
        let histories: Vec<Vec<f64>> = grouping
            .trends
            .iter()
            .map(|t| self.history.window(&t.key))
            .collect();
        let scored = score_batch(&grouping.trends, &histories);
        counts.scored = scored.len();

        // 7) Select.
        let selection = select_top(scored, top_n, &v.name, Utc::now(), counts);

        // 8) Ideas for the selected trends.
        let ideas = self.generate_ideas(selection.trends()).await;

        // 9) Run-end write-back: one history snapshot per trend that reports views,
        //    delivered posts into the seen cache.
        let snapshots: Vec<(String, f64)> = grouping
            .trends
            .iter()
            .filter_map(|t| Some((t.key.clone(), t.reported_views()? as f64)))
            .collect();
        if let Err(e) = self.history.record(&snapshots) {
            tracing::warn!(target: "pipeline", error = %e, "history write failed");
        }
        if let Some(seen) = &self.seen {
            let selected: HashSet<&str> = selection
                .trends()
                .iter()
                .map(|t| t.subject_key.as_str())
                .collect();
            let delivered: Vec<ItemKey> = grouping
                .trends
                .iter()
                .filter(|t| selected.contains(t.key.as_str()))
                .flat_map(|t| t.items.iter().map(|a| a.item.key.clone()))
                .collect();
            if let Err(e) = seen.commit(delivered) {
                tracing::warn!(target: "pipeline", error = %e, "seen cache write failed");
            }
        }

        let output = RunOutput {
            selection,
            ideas,
            sources,
        };
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(&output).await {
                tracing::warn!(target: "pipeline", sink = sink.name(), error = %e, "delivery failed");
            }
        }
        Ok(output)
    }

    /// Fixed-size batches, at most `max_in_flight` at a time, results kept in batch
    /// order. Returns the surviving annotations and the number of dropped batches.
    async fn annotate_all(&self, items: &[CanonicalItem]) -> (Vec<AnnotatedItem>, usize) {
        // Concrete futures keep `run_with` Send for every borrow lifetime.
        let batches: Vec<_> = items
            .chunks(self.config.annotation_batch_size)
            .map(|batch| self.annotate_batch(batch))
            .collect();
        let results: Vec<Result<Vec<AnnotatedItem>, AnnotationError>> = stream::iter(batches)
            .buffered(self.config.max_in_flight)
            .collect()
            .await;

        let mut out = Vec::with_capacity(items.len());
        let mut dropped = 0usize;
        for r in results {
            match r {
                Ok(mut a) => out.append(&mut a),
                Err(_) => dropped += 1,
            }
        }
        (out, dropped)
    }

    async fn annotate_batch(&self, batch: &[CanonicalItem]) -> Result<Vec<AnnotatedItem>, AnnotationError> {
        let annotator = &self.collaborators.annotator;
        let timeout = self.config.annotation_timeout();
        let mut attempt: u32 = 0;
        loop {
            let res = match tokio::time::timeout(timeout, annotator.annotate(batch)).await {
                Ok(r) => r,
                Err(_) => Err(AnnotationError::Timeout(self.config.annotation_timeout_ms)),
            };
            match res {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.config.annotation_max_retries => {
                    counter!("annotate_retries_total", "service" => annotator.name()).increment(1);
                    let wait = self.config.backoff(attempt);
                    tracing::debug!(target: "pipeline", attempt, wait_ms = wait.as_millis() as u64, error = %e, "annotation retry");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    let reason = match &e {
                        AnnotationError::Service(_) => "service",
                        AnnotationError::Timeout(_) => "timeout",
                        AnnotationError::InvalidResponse(_) => "invalid_response",
                        AnnotationError::Rejected(_) => "rejected",
                    };
                    counter!("annotate_batches_dropped_total", "reason" => reason).increment(1);
                    tracing::warn!(target: "pipeline", items = batch.len(), attempts = attempt + 1, error = %e, "annotation batch dropped");
                    return Err(e);
                }
            }
        }
    }

    async fn generate_ideas(&self, trends: &[ScoredTrend]) -> Vec<IdeaOutcome> {
        let gen = &self.collaborators.ideas;
        let timeout = self.config.idea_timeout();
        let calls: Vec<_> = trends.iter().map(|t| async move {
            let res = match tokio::time::timeout(timeout, gen.generate(t)).await {
                Ok(r) => r.map_err(|e| e.to_string()),
                Err(_) => Err(format!("idea generation timed out after {} ms", timeout.as_millis())),
            };
            match res {
                Ok(idea) => IdeaOutcome {
                    subject: t.subject.clone(),
                    idea,
                    placeholder: false,
                    error: None,
                },
                Err(err) => {
                    counter!("ideas_placeholder_total", "service" => gen.name()).increment(1);
                    tracing::warn!(target: "pipeline", subject = %t.subject, error = %err, "idea placeholder");
                    IdeaOutcome {
                        subject: t.subject.clone(),
                        idea: BusinessIdea::placeholder(),
                        placeholder: true,
                        error: Some(err),
                    }
                }
            }
        })
        .collect();
        stream::iter(calls)
            .buffered(self.config.max_in_flight)
            .collect()
            .await
    }
}
