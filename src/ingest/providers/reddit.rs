// src/ingest/providers/reddit.rs
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{count, from_unix, http_client, read_body, record_parse_time, str_field};
use crate::error::SourceError;
use crate::ingest::types::{RawRecord, SourceAdapter, REDDIT};

/// Reddit search listing. Reddit reports no view counts; upvotes map to likes.
pub struct RedditAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        user_agent: String,
        limit: u32,
    },
}

impl RedditAdapter {
    pub fn from_fixture(payload: &str) -> Self {
        Self {
            mode: Mode::Fixture(payload.to_string()),
        }
    }

    /// Reddit rejects requests without a descriptive `REDDIT_USER_AGENT`.
    pub fn from_env() -> Self {
        Self {
            mode: Mode::Http {
                client: http_client(),
                user_agent: std::env::var("REDDIT_USER_AGENT")
                    .unwrap_or_else(|_| "TrendScout/1.0".to_string()),
                limit: 50,
            },
        }
    }

    pub fn parse_listing(body: &str, collected_at: DateTime<Utc>) -> Result<Vec<RawRecord>, SourceError> {
        let t0 = Instant::now();
        let listing: Value = serde_json::from_str(body)?;
        let children = listing
            .pointer("/data/children")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::Parse("reddit: missing data.children".into()))?;

        let mut out = Vec::with_capacity(children.len());
        for child in children {
            let Some(post) = child.get("data") else {
                continue;
            };
            let title = str_field(post, "title").unwrap_or_default();
            let content = match str_field(post, "selftext") {
                Some(body) => format!("{title}. {body}"),
                None => title,
            };
            let mut rec = RawRecord::new(
                REDDIT,
                str_field(post, "id").unwrap_or_default(),
                content,
                collected_at,
            );
            rec.url = str_field(post, "permalink").map(|p| format!("https://www.reddit.com{p}"));
            rec.likes = count(post.get("ups"));
            rec.comments = count(post.get("num_comments"));
            rec.views = count(post.get("view_count"));
            rec.posted_at = from_unix(post.get("created_utc"));
            out.push(rec);
        }
        record_parse_time(REDDIT, t0);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    async fn collect(&self, topic_keywords: &[String]) -> Result<Vec<RawRecord>, SourceError> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_listing(s, Utc::now()),
            Mode::Http {
                client,
                user_agent,
                limit,
            } => {
                let query = topic_keywords
                    .iter()
                    .take(super::MAX_KEYWORDS)
                    .map(|k| format!("\"{k}\""))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                let limit = limit.to_string();
                let resp = client
                    .get("https://www.reddit.com/search.json")
                    .header(reqwest::header::USER_AGENT, user_agent.as_str())
                    .query(&[
                        ("q", query.as_str()),
                        ("sort", "hot"),
                        ("t", "day"),
                        ("limit", limit.as_str()),
                    ])
                    .send()
                    .await?;
                let body = read_body(resp, REDDIT).await?;
                Self::parse_listing(&body, Utc::now())
            }
        }
    }

    fn name(&self) -> &'static str {
        REDDIT
    }
}
