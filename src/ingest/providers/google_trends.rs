// src/ingest/providers/google_trends.rs
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use super::{http_client, read_body, record_parse_time};
use crate::error::SourceError;
use crate::ingest::matches_keywords;
use crate::ingest::types::{RawRecord, SourceAdapter, GOOGLE_TRENDS};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    /// `<ht:approx_traffic>`; the deserializer matches local names.
    approx_traffic: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// "20,000+" → 20000, "2K+" → 2000, "1M+" → 1000000.
fn parse_traffic(s: &str) -> Option<u64> {
    let t = s.trim().trim_end_matches('+').replace(',', "");
    let (num, mult) = match t.chars().last()? {
        'K' | 'k' => (&t[..t.len() - 1], 1_000.0),
        'M' | 'm' => (&t[..t.len() - 1], 1_000_000.0),
        _ => (t.as_str(), 1.0),
    };
    num.trim().parse::<f64>().ok().map(|n| (n * mult) as u64)
}

/// Stable id for a search term; the feed carries none.
fn term_id(title: &str) -> String {
    let digest = Sha256::digest(title.trim().to_lowercase().as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Daily trending searches RSS. Search volume stands in for views.
pub struct GoogleTrendsAdapter {
    geo: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl GoogleTrendsAdapter {
    pub fn from_fixture(xml: &str, geo: &str) -> Self {
        Self {
            geo: geo.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    /// Geo from `TRENDS_GEO` (default "US").
    pub fn from_env() -> Self {
        Self {
            geo: std::env::var("TRENDS_GEO").unwrap_or_else(|_| "US".to_string()),
            mode: Mode::Http {
                client: http_client(),
            },
        }
    }

    /// Parse the feed; only searches mentioning a topic keyword are kept.
    pub fn parse_feed(
        xml: &str,
        geo: &str,
        topic_keywords: &[String],
        collected_at: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let t0 = Instant::now();
        let rss: Rss = from_str(xml).map_err(|e| SourceError::Parse(format!("trends rss: {e}")))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let Some(title) = it.title.filter(|t| !t.trim().is_empty()) else {
                continue;
            };
            if !matches_keywords(&title, topic_keywords) {
                continue;
            }
            let mut rec = RawRecord::new(GOOGLE_TRENDS, term_id(&title), title, collected_at);
            rec.url = it.link;
            rec.views = it.approx_traffic.as_deref().and_then(parse_traffic);
            rec.country = Some(geo.to_string()).filter(|g| !g.is_empty());
            rec.posted_at = it.pub_date.as_deref().and_then(parse_rfc2822);
            out.push(rec);
        }

        record_parse_time(GOOGLE_TRENDS, t0);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for GoogleTrendsAdapter {
    async fn collect(&self, topic_keywords: &[String]) -> Result<Vec<RawRecord>, SourceError> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_feed(s, &self.geo, topic_keywords, Utc::now()),
            Mode::Http { client } => {
                let resp = client
                    .get("https://trends.google.com/trending/rss")
                    .query(&[("geo", self.geo.as_str())])
                    .send()
                    .await?;
                let body = read_body(resp, GOOGLE_TRENDS).await?;
                Self::parse_feed(&body, &self.geo, topic_keywords, Utc::now())
            }
        }
    }

    fn name(&self) -> &'static str {
        GOOGLE_TRENDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traffic_suffixes() {
        assert_eq!(parse_traffic("20,000+"), Some(20_000));
        assert_eq!(parse_traffic("2K+"), Some(2_000));
        assert_eq!(parse_traffic("1M+"), Some(1_000_000));
        assert_eq!(parse_traffic("lots"), None);
    }

    #[test]
    fn term_id_is_case_insensitive_and_stable() {
        assert_eq!(term_id("Cold Brew"), term_id("  cold brew "));
        assert_eq!(term_id("Cold Brew").len(), 16);
    }

    #[test]
    fn namespaced_traffic_element_fills_views() {
        let xml = r#"<rss xmlns:ht="https://trends.google.com/trending/rss"><channel>
            <item><title>cold brew</title><ht:approx_traffic>50K+</ht:approx_traffic></item>
            </channel></rss>"#;
        let recs = GoogleTrendsAdapter::parse_feed(xml, "US", &[], Utc::now()).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].views, Some(50_000));
    }

    #[test]
    fn rfc2822_dates_parse() {
        let dt = parse_rfc2822("Sat, 01 Mar 2025 08:00:00 +0000").unwrap();
        assert_eq!(dt.timestamp(), 1_740_816_000);
    }
}
