// src/ingest/providers/youtube.rs
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;

use super::{count, from_rfc3339, http_client, read_body, record_parse_time, str_field};
use crate::error::SourceError;
use crate::ingest::types::{RawRecord, SourceAdapter, YOUTUBE};

const API: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube Data API v3: `search.list` for ids, then `videos.list` for statistics.
pub struct YouTubeAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        api_key: Option<String>,
        max_results: u32,
    },
}

impl YouTubeAdapter {
    /// Fixture is a `videos.list` response.
    pub fn from_fixture(payload: &str) -> Self {
        Self {
            mode: Mode::Fixture(payload.to_string()),
        }
    }

    pub fn from_env() -> Self {
        Self {
            mode: Mode::Http {
                client: http_client(),
                api_key: std::env::var("YOUTUBE_API_KEY").ok().filter(|k| !k.is_empty()),
                max_results: 25,
            },
        }
    }

    pub fn parse_videos(body: &str, collected_at: DateTime<Utc>) -> Result<Vec<RawRecord>, SourceError> {
        let t0 = Instant::now();
        let resp: Value = serde_json::from_str(body)?;
        let items = resp
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::Parse("youtube: missing items".into()))?;

        let mut out = Vec::with_capacity(items.len());
        for it in items {
            let empty = Value::Null;
            let snippet = it.get("snippet").unwrap_or(&empty);
            let stats = it.get("statistics").unwrap_or(&empty);
            let title = str_field(snippet, "title").unwrap_or_default();
            let content = match str_field(snippet, "description") {
                Some(d) => format!("{title}. {d}"),
                None => title,
            };
            let id = str_field(it, "id").unwrap_or_default();
            let mut rec = RawRecord::new(YOUTUBE, id.clone(), content, collected_at);
            if !id.is_empty() {
                rec.url = Some(format!("https://www.youtube.com/watch?v={id}"));
            }
            rec.views = count(stats.get("viewCount"));
            rec.likes = count(stats.get("likeCount"));
            rec.comments = count(stats.get("commentCount"));
            rec.posted_at = from_rfc3339(snippet.get("publishedAt"));
            out.push(rec);
        }
        record_parse_time(YOUTUBE, t0);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for YouTubeAdapter {
    async fn collect(&self, topic_keywords: &[String]) -> Result<Vec<RawRecord>, SourceError> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_videos(s, Utc::now()),
            Mode::Http {
                client,
                api_key,
                max_results,
            } => {
                let Some(key) = api_key else {
                    return Err(SourceError::Unavailable("YOUTUBE_API_KEY not set".into()));
                };
                let query = topic_keywords
                    .iter()
                    .take(super::MAX_KEYWORDS)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("|");
                let after = (Utc::now() - Duration::hours(48)).to_rfc3339_opts(SecondsFormat::Secs, true);
                let max = max_results.to_string();

                let resp = client
                    .get(format!("{API}/search"))
                    .query(&[
                        ("part", "id"),
                        ("type", "video"),
                        ("order", "viewCount"),
                        ("q", query.as_str()),
                        ("publishedAfter", after.as_str()),
                        ("maxResults", max.as_str()),
                        ("key", key.as_str()),
                    ])
                    .send()
                    .await?;
                let search: Value = serde_json::from_str(&read_body(resp, YOUTUBE).await?)?;
                let ids: Vec<&str> = search
                    .get("items")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(|i| i.pointer("/id/videoId").and_then(Value::as_str))
                            .collect()
                    })
                    .unwrap_or_default();
                if ids.is_empty() {
                    return Ok(Vec::new());
                }

                let id_list = ids.join(",");
                let resp = client
                    .get(format!("{API}/videos"))
                    .query(&[
                        ("part", "snippet,statistics"),
                        ("id", id_list.as_str()),
                        ("key", key.as_str()),
                    ])
                    .send()
                    .await?;
                let body = read_body(resp, YOUTUBE).await?;
                Self::parse_videos(&body, Utc::now())
            }
        }
    }

    fn name(&self) -> &'static str {
        YOUTUBE
    }
}
