// tests/pipeline.rs
//
// Orchestrator behavior with in-process adapters and collaborators:
// partial source failure, timeouts, annotation retry/drop, idea placeholders,
// deadline and cancellation, history and seen-cache write-back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use trend_scout::analyze::annotate::{AnnotatedItem, AnnotationService, HeuristicAnnotator};
use trend_scout::analyze::ideas::{BusinessIdea, IdeaGenerationService, TemplateIdeaGenerator};
use trend_scout::analyze::scoring::ScoredTrend;
use trend_scout::analyze::Collaborators;
use trend_scout::config::PipelineConfig;
use trend_scout::history::{HistoryStore, TrendHistory};
use trend_scout::ingest::config::VerticalCatalog;
use trend_scout::ingest::normalize::CanonicalItem;
use trend_scout::ingest::seen::SeenCache;
use trend_scout::ingest::types::{RawRecord, SourceAdapter};
use trend_scout::sink::MemorySink;
use trend_scout::{AnnotationError, GenerationError, Pipeline, PipelineError, SourceError};

// ---------- adapters ----------

struct StaticAdapter {
    name: &'static str,
    records: Vec<RawRecord>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    async fn collect(&self, _kw: &[String]) -> Result<Vec<RawRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
    fn name(&self) -> &'static str {
        self.name
    }
}

struct FailingAdapter {
    name: &'static str,
    err: SourceError,
}

#[async_trait]
impl SourceAdapter for FailingAdapter {
    async fn collect(&self, _kw: &[String]) -> Result<Vec<RawRecord>, SourceError> {
        Err(self.err.clone())
    }
    fn name(&self) -> &'static str {
        self.name
    }
}

struct SlowAdapter {
    name: &'static str,
    delay: Duration,
}

#[async_trait]
impl SourceAdapter for SlowAdapter {
    async fn collect(&self, _kw: &[String]) -> Result<Vec<RawRecord>, SourceError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![post(self.name, "slow", "slow cold brew", 100, 1)])
    }
    fn name(&self) -> &'static str {
        self.name
    }
}

fn post(platform: &str, id: &str, text: &str, views: u64, comments: u64) -> RawRecord {
    let now = Utc::now();
    let mut r = RawRecord::new(platform, id, text, now);
    r.views = Some(views);
    r.comments = Some(comments);
    r.shares = Some(comments / 2);
    r.country = Some("US".into());
    r.posted_at = Some(now - chrono::Duration::hours(4));
    r
}

fn tiktok_posts() -> Vec<RawRecord> {
    vec![
        post("tiktok", "t1", "Trying the lavender oat milk latte everyone loves", 6_000, 150),
        post("tiktok", "t2", "Pumpkin spice cold brew is back", 3_000, 10),
    ]
}

fn instagram_posts() -> Vec<RawRecord> {
    vec![
        post("instagram", "i1", "Our lavender oat milk latte just dropped", 4_000, 100),
        post("instagram", "i2", "Matcha croissant from the corner bakery", 1_500, 6),
    ]
}

fn youtube_posts() -> Vec<RawRecord> {
    vec![post("youtube", "y1", "How to make a lavender oat milk latte", 2_000, 50)]
}

fn ok(name: &'static str, records: Vec<RawRecord>) -> Box<dyn SourceAdapter> {
    Box::new(StaticAdapter {
        name,
        records,
        calls: Arc::new(AtomicUsize::new(0)),
    })
}

fn five_healthy() -> Vec<Box<dyn SourceAdapter>> {
    vec![
        ok("tiktok", tiktok_posts()),
        ok("instagram", instagram_posts()),
        ok("google_trends", vec![]),
        ok("reddit", vec![]),
        ok("youtube", youtube_posts()),
    ]
}

// ---------- collaborators ----------

/// Fails the first `failures` calls with `err`, then behaves like the heuristic one.
struct FlakyAnnotator {
    failures: usize,
    err: AnnotationError,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AnnotationService for FlakyAnnotator {
    async fn annotate(&self, batch: &[CanonicalItem]) -> Result<Vec<AnnotatedItem>, AnnotationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(self.err.clone());
        }
        HeuristicAnnotator.annotate(batch).await
    }
    fn name(&self) -> &'static str {
        "flaky"
    }
}

struct BrokenIdeas;

#[async_trait]
impl IdeaGenerationService for BrokenIdeas {
    async fn generate(&self, trend: &ScoredTrend) -> Result<BusinessIdea, GenerationError> {
        if trend.subject.contains("Lavender") {
            Err(GenerationError("upstream 500".into()))
        } else {
            TemplateIdeaGenerator.generate(trend).await
        }
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

fn flaky(failures: usize, err: AnnotationError) -> (Collaborators, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Collaborators {
        annotator: Arc::new(FlakyAnnotator {
            failures,
            err,
            calls: calls.clone(),
        }),
        ideas: Arc::new(TemplateIdeaGenerator),
    };
    (c, calls)
}

fn config() -> PipelineConfig {
    PipelineConfig {
        adapter_timeout_ms: 1_000,
        annotation_backoff_ms: 10,
        ..Default::default()
    }
}

fn pipeline(adapters: Vec<Box<dyn SourceAdapter>>) -> Pipeline {
    Pipeline::new(adapters, Collaborators::offline(), VerticalCatalog::builtin(), config())
}

// ---------- tests ----------

#[tokio::test]
async fn healthy_run_selects_lavender_first_with_ideas() {
    let out = pipeline(five_healthy()).run("coffee").await.unwrap();

    let subjects: Vec<&str> = out
        .selection
        .trends()
        .iter()
        .map(|t| t.subject.as_str())
        .collect();
    assert_eq!(subjects[0], "Lavender Oat Milk Latte");
    assert!(subjects.len() <= 3);
    assert_eq!(out.selection.trends()[0].post_count, 3);
    assert_eq!(out.ideas.len(), subjects.len());
    assert!(out.ideas.iter().all(|i| !i.placeholder));

    let counts = out.selection.counts();
    assert_eq!(counts.collected, 5);
    assert_eq!(counts.deduplicated, 5);
    assert_eq!(counts.annotated, 5);
    assert_eq!(counts.scored, 3);
}

#[tokio::test]
async fn two_of_five_sources_failing_still_selects() {
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        ok("tiktok", tiktok_posts()),
        Box::new(FailingAdapter {
            name: "instagram",
            err: SourceError::RateLimited("HTTP 429".into()),
        }),
        ok("google_trends", vec![]),
        Box::new(FailingAdapter {
            name: "reddit",
            err: SourceError::Unavailable("dns".into()),
        }),
        ok("youtube", youtube_posts()),
    ];
    let out = pipeline(adapters).run("coffee").await.unwrap();
    assert!(!out.selection.is_empty());
    assert_eq!(out.sources.len(), 5);
    assert_eq!(out.sources.iter().filter(|s| s.error.is_some()).count(), 2);
    assert_eq!(out.sources[1].adapter, "instagram");
}

#[tokio::test]
async fn all_sources_failing_or_empty_aborts() {
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        Box::new(FailingAdapter {
            name: "tiktok",
            err: SourceError::Unavailable("down".into()),
        }),
        ok("instagram", vec![]),
        Box::new(FailingAdapter {
            name: "google_trends",
            err: SourceError::Parse("bad xml".into()),
        }),
        ok("reddit", vec![]),
        ok("youtube", vec![]),
    ];
    let err = pipeline(adapters).run("coffee").await.unwrap_err();
    assert!(matches!(err, PipelineError::AllSourcesFailed { attempted: 5 }));
}

#[tokio::test]
async fn unknown_vertical_fails_before_collection() {
    let calls = Arc::new(AtomicUsize::new(0));
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(StaticAdapter {
        name: "tiktok",
        records: tiktok_posts(),
        calls: calls.clone(),
    })];
    let err = pipeline(adapters).run("florist").await.unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_adapter_times_out_without_blocking_others() {
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        ok("tiktok", tiktok_posts()),
        Box::new(SlowAdapter {
            name: "reddit",
            delay: Duration::from_secs(60),
        }),
    ];
    let out = pipeline(adapters).run("coffee").await.unwrap();
    let reddit = &out.sources[1];
    assert_eq!(reddit.records, 0);
    assert!(reddit.error.as_deref().unwrap_or_default().contains("timed out"));
    assert!(out.selection.trends().iter().all(|t| t.platforms == vec!["tiktok"]));
}

#[tokio::test(start_paused = true)]
async fn transient_annotation_errors_are_retried() {
    let (collab, calls) = flaky(2, AnnotationError::Service("503".into()));
    let cfg = PipelineConfig {
        annotation_batch_size: 10,
        ..config()
    };
    let p = Pipeline::new(five_healthy(), collab, VerticalCatalog::builtin(), cfg);
    let out = p.run("coffee").await.unwrap();
    // One batch: two failures then success.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(out.selection.counts().annotation_batches_dropped, 0);
    assert_eq!(out.selection.counts().annotated, 5);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_drop_the_batch_only() {
    // Batch size 1: the first batch fails on every attempt (1 + 3 retries).
    let (collab, calls) = flaky(4, AnnotationError::Timeout(30_000));
    let cfg = PipelineConfig {
        annotation_batch_size: 1,
        max_in_flight: 1,
        ..config()
    };
    let p = Pipeline::new(five_healthy(), collab, VerticalCatalog::builtin(), cfg);
    let out = p.run("coffee").await.unwrap();
    assert_eq!(out.selection.counts().annotation_batches_dropped, 1);
    assert_eq!(out.selection.counts().annotated, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4 + 4);
}

#[tokio::test]
async fn invalid_response_is_not_retried() {
    let (collab, calls) = flaky(1, AnnotationError::InvalidResponse("not json".into()));
    let cfg = PipelineConfig {
        annotation_batch_size: 1,
        max_in_flight: 1,
        ..config()
    };
    let p = Pipeline::new(five_healthy(), collab, VerticalCatalog::builtin(), cfg);
    let out = p.run("coffee").await.unwrap();
    assert_eq!(out.selection.counts().annotation_batches_dropped, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn every_batch_rejected_is_an_empty_result() {
    let (collab, _) = flaky(usize::MAX, AnnotationError::Rejected("budget exhausted".into()));
    let p = Pipeline::new(five_healthy(), collab, VerticalCatalog::builtin(), config());
    let err = p.run("coffee").await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyResult { stage: "annotation" }));
}

#[tokio::test]
async fn failed_idea_keeps_trend_with_placeholder() {
    let collab = Collaborators {
        annotator: Arc::new(HeuristicAnnotator),
        ideas: Arc::new(BrokenIdeas),
    };
    let p = Pipeline::new(five_healthy(), collab, VerticalCatalog::builtin(), config());
    let out = p.run("coffee").await.unwrap();

    assert_eq!(out.ideas.len(), out.selection.len());
    let lav = &out.ideas[0];
    assert_eq!(lav.subject, "Lavender Oat Milk Latte");
    assert!(lav.placeholder);
    assert_eq!(lav.idea, BusinessIdea::placeholder());
    assert!(lav.error.as_deref().unwrap_or_default().contains("upstream 500"));
    assert_eq!(out.placeholder_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn run_deadline_aborts_in_flight_work() {
    let cfg = PipelineConfig {
        adapter_timeout_ms: 600_000,
        run_deadline_ms: Some(5_000),
        ..config()
    };
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(SlowAdapter {
        name: "youtube",
        delay: Duration::from_secs(120),
    })];
    let p = Pipeline::new(adapters, Collaborators::offline(), VerticalCatalog::builtin(), cfg);
    let err = p.run("coffee").await.unwrap_err();
    assert!(matches!(err, PipelineError::DeadlineExceeded(5_000)));
}

#[tokio::test(start_paused = true)]
async fn caller_cancellation_stops_the_run() {
    let cfg = PipelineConfig {
        adapter_timeout_ms: 600_000,
        ..config()
    };
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(SlowAdapter {
        name: "youtube",
        delay: Duration::from_secs(120),
    })];
    let history = Arc::new(TrendHistory::in_memory());
    let p = Pipeline::new(adapters, Collaborators::offline(), VerticalCatalog::builtin(), cfg)
        .with_history(history.clone());

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });
    let err = p.run_with("coffee", None, token).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert!(history.window("slow cold brew").is_empty());
}

#[tokio::test]
async fn history_feeds_velocity_on_the_next_run() {
    let history = Arc::new(TrendHistory::in_memory());
    history.seed("lavender oat milk latte", &[10_000.0]);
    let p = pipeline(five_healthy()).with_history(history.clone());

    let out = p.run("coffee").await.unwrap();
    let lav = &out.selection.trends()[0];
    assert_eq!(lav.views, 12_000);
    assert_eq!(lav.components.velocity, 100.0);
    assert!((lav.components.momentum - 60.0).abs() < 1e-9);
    assert!(lav.uts > 60.0, "uts {}", lav.uts);

    assert_eq!(history.window("lavender oat milk latte"), vec![10_000.0, 12_000.0]);
    assert_eq!(history.window("matcha croissant"), vec![1_500.0]);
}

#[tokio::test]
async fn seen_cache_drops_delivered_posts_on_the_next_run() {
    let seen = Arc::new(SeenCache::in_memory());
    let cfg = PipelineConfig {
        top_n: 1,
        ..config()
    };
    let p = Pipeline::new(five_healthy(), Collaborators::offline(), VerticalCatalog::builtin(), cfg)
        .with_seen_cache(seen.clone());

    let first = p.run("coffee").await.unwrap();
    assert_eq!(first.selection.trends()[0].subject, "Lavender Oat Milk Latte");
    assert_eq!(seen.len(), 3);

    let second = p.run("coffee").await.unwrap();
    assert_eq!(second.selection.counts().previously_seen, 3);
    assert_ne!(second.selection.trends()[0].subject, "Lavender Oat Milk Latte");
}

#[tokio::test]
async fn sinks_receive_every_successful_run() {
    let sink = Arc::new(MemorySink::default());
    let p = pipeline(five_healthy()).with_sink(sink.clone());
    let out = p.run_with("coffee", Some(1), CancellationToken::new()).await.unwrap();
    assert_eq!(out.selection.len(), 1);
    assert_eq!(sink.len(), 1);
    assert_eq!(sink.latest().unwrap(), out);
}

#[tokio::test]
async fn run_is_spawnable_on_the_runtime() {
    let p = Arc::new(pipeline(five_healthy()));
    let task = tokio::spawn({
        let p = p.clone();
        async move { p.run_with("coffee", Some(2), CancellationToken::new()).await }
    });
    let out = task.await.unwrap().unwrap();
    assert_eq!(out.selection.trends()[0].subject, "Lavender Oat Milk Latte");
    assert_eq!(out.ideas.len(), 2);
}
