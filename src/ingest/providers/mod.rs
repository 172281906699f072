// src/ingest/providers/mod.rs
pub mod google_trends;
pub mod instagram;
pub mod reddit;
pub mod tiktok;
pub mod youtube;

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;

use chrono::{DateTime, TimeZone, Utc};
use metrics::histogram;
use serde_json::Value;

use crate::error::SourceError;
use crate::ingest::types::SourceAdapter;

/// Keywords per request; the scrapers bill per keyword.
pub(crate) const MAX_KEYWORDS: usize = 5;

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("trend-scout/0.1")
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map HTTP status to the soft-failure taxonomy and return the body.
pub(crate) async fn read_body(resp: reqwest::Response, source: &str) -> Result<String, SourceError> {
    let status = resp.status();
    if status.as_u16() == 429 {
        return Err(SourceError::RateLimited(format!("{source}: HTTP 429")));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        return Err(SourceError::Unavailable(format!(
            "{source}: HTTP {}: {snippet}",
            status.as_u16()
        )));
    }
    resp.text().await.map_err(SourceError::from)
}

pub(crate) fn record_parse_time(source: &'static str, t0: Instant) {
    histogram!("ingest_parse_ms", "adapter" => source).record(t0.elapsed().as_secs_f64() * 1_000.0);
}

/// Counters arrive as numbers, numeric strings ("1234") or hidden (-1 / null).
pub(crate) fn count(v: Option<&Value>) -> Option<u64> {
    match v? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().replace(',', "").parse::<u64>().ok(),
        _ => None,
    }
}

/// Ids arrive as strings or numbers depending on the scraper version.
pub(crate) fn id_string(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn from_unix(secs: Option<&Value>) -> Option<DateTime<Utc>> {
    let secs = match secs? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Utc.timestamp_opt(secs, 0).single()
}

pub(crate) fn from_rfc3339(ts: Option<&Value>) -> Option<DateTime<Utc>> {
    ts?.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn str_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Build the five production adapters from environment credentials, in the
/// registration order used for dedup precedence.
pub fn default_adapters() -> Vec<Box<dyn SourceAdapter>> {
    vec![
        Box::new(tiktok::TikTokAdapter::from_env()),
        Box::new(instagram::InstagramAdapter::from_env()),
        Box::new(google_trends::GoogleTrendsAdapter::from_env()),
        Box::new(reddit::RedditAdapter::from_env()),
        Box::new(youtube::YouTubeAdapter::from_env()),
    ]
}

/// Fixture-backed adapters from `dir` (`tiktok.json`, `instagram.json`,
/// `google_trends.xml`, `reddit.json`, `youtube.json`). Missing files are skipped.
pub fn fixture_adapters(dir: &Path) -> anyhow::Result<Vec<Box<dyn SourceAdapter>>> {
    fn read(dir: &Path, name: &str) -> anyhow::Result<Option<String>> {
        let p = dir.join(name);
        if !p.exists() {
            return Ok(None);
        }
        Ok(Some(
            std::fs::read_to_string(&p).with_context(|| format!("reading fixture {}", p.display()))?,
        ))
    }

    let mut out: Vec<Box<dyn SourceAdapter>> = Vec::new();
    if let Some(s) = read(dir, "tiktok.json")? {
        out.push(Box::new(tiktok::TikTokAdapter::from_fixture(&s)));
    }
    if let Some(s) = read(dir, "instagram.json")? {
        out.push(Box::new(instagram::InstagramAdapter::from_fixture(&s)));
    }
    if let Some(s) = read(dir, "google_trends.xml")? {
        out.push(Box::new(google_trends::GoogleTrendsAdapter::from_fixture(&s, "US")));
    }
    if let Some(s) = read(dir, "reddit.json")? {
        out.push(Box::new(reddit::RedditAdapter::from_fixture(&s)));
    }
    if let Some(s) = read(dir, "youtube.json")? {
        out.push(Box::new(youtube::YouTubeAdapter::from_fixture(&s)));
    }
    if out.is_empty() {
        anyhow::bail!("no fixtures found in {}", dir.display());
    }
    Ok(out)
}
