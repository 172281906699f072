// src/ingest/mod.rs
pub mod config;
pub mod normalize;
pub mod providers;
pub mod seen;
pub mod types;

use std::time::{Duration, Instant};

use futures::future::join_all;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::SourceError;
use crate::ingest::types::{RawRecord, SourceAdapter};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_records_total",
            "Raw records returned by source adapters."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Adapter failures (unavailable, rate limited, timeout, parse)."
        );
        describe_histogram!(
            "ingest_adapter_ms",
            "Adapter collect time in milliseconds."
        );
    });
}

/// Normalize text: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. decoded &nbsp;)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 2000 chars
    if out.chars().count() > 2000 {
        out = out.chars().take(2000).collect();
    }

    out
}

/// Outcome of one adapter within a collection round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub adapter: String,
    pub records: usize,
    pub error: Option<String>,
}

impl SourceReport {
    pub fn usable(&self) -> bool {
        self.error.is_none() && self.records > 0
    }
}

/// Invoke every adapter concurrently, each under its own timeout, and wait for all
/// of them to settle. Records are merged in adapter registration order so that
/// "first occurrence wins" in dedup is stable across runs.
pub async fn collect_all(
    adapters: &[Box<dyn SourceAdapter>],
    keywords: &[String],
    per_adapter_timeout: Duration,
) -> (Vec<RawRecord>, Vec<SourceReport>) {
    ensure_metrics_described();

    let timeout_ms = per_adapter_timeout.as_millis() as u64;
    let calls = adapters.iter().map(|a| async move {
        let t0 = Instant::now();
        let res = match tokio::time::timeout(per_adapter_timeout, a.collect(keywords)).await {
            Ok(r) => r,
            Err(_) => Err(SourceError::Timeout(timeout_ms)),
        };
        histogram!("ingest_adapter_ms", "adapter" => a.name())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        (a.name(), res)
    });

    let mut merged = Vec::new();
    let mut reports = Vec::with_capacity(adapters.len());
    for (name, res) in join_all(calls).await {
        match res {
            Ok(mut records) => {
                counter!("ingest_records_total", "adapter" => name)
                    .increment(records.len() as u64);
                tracing::info!(target: "ingest", adapter = name, records = records.len(), "adapter done");
                reports.push(SourceReport {
                    adapter: name.to_string(),
                    records: records.len(),
                    error: None,
                });
                merged.append(&mut records);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", adapter = name, error = %e, "adapter failed");
                counter!("ingest_source_errors_total", "adapter" => name, "kind" => e.kind())
                    .increment(1);
                reports.push(SourceReport {
                    adapter: name.to_string(),
                    records: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    (merged, reports)
}

/// Case-insensitive "mentions any keyword" check. An empty keyword list matches all.
pub fn matches_keywords(text: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let hay = text.to_lowercase();
    keywords
        .iter()
        .any(|k| !k.trim().is_empty() && hay.contains(&k.trim().to_lowercase()))
}
