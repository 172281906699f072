// src/ingest/providers/tiktok.rs
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{count, from_unix, http_client, id_string, read_body, record_parse_time, str_field};
use crate::error::SourceError;
use crate::ingest::types::{RawRecord, SourceAdapter, TIKTOK};

const ACTOR_URL: &str =
    "https://api.apify.com/v2/acts/clockworks~tiktok-scraper/run-sync-get-dataset-items";

/// TikTok posts via the Apify `clockworks~tiktok-scraper` actor.
pub struct TikTokAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        token: Option<String>,
        results_per_keyword: u32,
    },
}

impl TikTokAdapter {
    pub fn from_fixture(payload: &str) -> Self {
        Self {
            mode: Mode::Fixture(payload.to_string()),
        }
    }

    /// Reads `APIFY_API_TOKEN`; without it every collect fails softly.
    pub fn from_env() -> Self {
        Self {
            mode: Mode::Http {
                client: http_client(),
                token: std::env::var("APIFY_API_TOKEN").ok().filter(|t| !t.is_empty()),
                results_per_keyword: 50,
            },
        }
    }

    /// Parse a dataset-items array into raw records.
    pub fn parse_items(body: &str, collected_at: DateTime<Utc>) -> Result<Vec<RawRecord>, SourceError> {
        let t0 = Instant::now();
        let items: Vec<Value> = serde_json::from_str(body)?;
        let mut out = Vec::with_capacity(items.len());
        for it in &items {
            let mut rec = RawRecord::new(
                TIKTOK,
                id_string(it.get("id")),
                str_field(it, "text").unwrap_or_default(),
                collected_at,
            );
            rec.url = str_field(it, "webVideoUrl");
            rec.views = count(it.get("playCount"));
            rec.likes = count(it.get("diggCount"));
            rec.comments = count(it.get("commentCount"));
            rec.shares = count(it.get("shareCount"));
            rec.saves = count(it.get("collectCount"));
            rec.country = str_field(it, "locationCreated");
            rec.posted_at = from_unix(it.get("createTime"));
            out.push(rec);
        }
        record_parse_time(TIKTOK, t0);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for TikTokAdapter {
    async fn collect(&self, topic_keywords: &[String]) -> Result<Vec<RawRecord>, SourceError> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items(s, Utc::now()),
            Mode::Http {
                client,
                token,
                results_per_keyword,
            } => {
                let Some(token) = token else {
                    return Err(SourceError::Unavailable("APIFY_API_TOKEN not set".into()));
                };
                let hashtags: Vec<String> = topic_keywords
                    .iter()
                    .take(super::MAX_KEYWORDS)
                    .map(|k| k.replace(' ', ""))
                    .collect();
                let input = json!({
                    "hashtags": hashtags,
                    "resultsPerPage": results_per_keyword,
                    "shouldDownloadVideos": false,
                });
                let resp = client
                    .post(ACTOR_URL)
                    .bearer_auth(token)
                    .json(&input)
                    .send()
                    .await?;
                let body = read_body(resp, TIKTOK).await?;
                Self::parse_items(&body, Utc::now())
            }
        }
    }

    fn name(&self) -> &'static str {
        TIKTOK
    }
}
