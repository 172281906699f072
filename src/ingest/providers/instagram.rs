// src/ingest/providers/instagram.rs
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{count, from_rfc3339, http_client, id_string, read_body, record_parse_time, str_field};
use crate::error::SourceError;
use crate::ingest::types::{RawRecord, SourceAdapter, INSTAGRAM};

const ACTOR_URL: &str =
    "https://api.apify.com/v2/acts/apify~instagram-hashtag-scraper/run-sync-get-dataset-items";

/// Instagram hashtag posts via the Apify `apify~instagram-hashtag-scraper` actor.
/// The scraper exposes no share or save counts.
pub struct InstagramAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        token: Option<String>,
        results_limit: u32,
    },
}

impl InstagramAdapter {
    pub fn from_fixture(payload: &str) -> Self {
        Self {
            mode: Mode::Fixture(payload.to_string()),
        }
    }

    pub fn from_env() -> Self {
        Self {
            mode: Mode::Http {
                client: http_client(),
                token: std::env::var("APIFY_API_TOKEN").ok().filter(|t| !t.is_empty()),
                results_limit: 50,
            },
        }
    }

    pub fn parse_items(body: &str, collected_at: DateTime<Utc>) -> Result<Vec<RawRecord>, SourceError> {
        let t0 = Instant::now();
        let items: Vec<Value> = serde_json::from_str(body)?;
        let mut out = Vec::with_capacity(items.len());
        for it in &items {
            let mut id = id_string(it.get("id"));
            if id.is_empty() {
                id = id_string(it.get("shortCode"));
            }
            let mut rec = RawRecord::new(
                INSTAGRAM,
                id,
                str_field(it, "caption").unwrap_or_default(),
                collected_at,
            );
            rec.url = str_field(it, "url");
            // Reels report plays, photos report nothing.
            rec.views = count(it.get("videoViewCount")).or_else(|| count(it.get("videoPlayCount")));
            rec.likes = count(it.get("likesCount"));
            rec.comments = count(it.get("commentsCount"));
            rec.posted_at = from_rfc3339(it.get("timestamp"));
            out.push(rec);
        }
        record_parse_time(INSTAGRAM, t0);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for InstagramAdapter {
    async fn collect(&self, topic_keywords: &[String]) -> Result<Vec<RawRecord>, SourceError> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items(s, Utc::now()),
            Mode::Http {
                client,
                token,
                results_limit,
            } => {
                let Some(token) = token else {
                    return Err(SourceError::Unavailable("APIFY_API_TOKEN not set".into()));
                };
                let hashtags: Vec<String> = topic_keywords
                    .iter()
                    .take(super::MAX_KEYWORDS)
                    .map(|k| k.replace(' ', "").to_lowercase())
                    .collect();
                let resp = client
                    .post(ACTOR_URL)
                    .bearer_auth(token)
                    .json(&json!({ "hashtags": hashtags, "resultsLimit": results_limit }))
                    .send()
                    .await?;
                let body = read_body(resp, INSTAGRAM).await?;
                Self::parse_items(&body, Utc::now())
            }
        }
    }

    fn name(&self) -> &'static str {
        INSTAGRAM
    }
}
