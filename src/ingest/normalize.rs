// src/ingest/normalize.rs
//! Raw records → canonical items. Pure: no I/O, no clock reads.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::normalize_text;
use crate::ingest::types::{ItemKey, RawRecord};

/// Deduplicated, normalized unit keyed by `(platform, post_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalItem {
    pub key: ItemKey,
    /// Display form of the content.
    pub content: String,
    /// Lower-cased comparison form of `content`.
    pub match_text: String,
    pub url: Option<String>,
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub shares: Option<u64>,
    pub saves: Option<u64>,
    pub country: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
    pub age_hours: f64,
    /// Age was missing or negative and got clamped to 0.
    pub age_flagged: bool,
}

impl CanonicalItem {
    pub fn platform(&self) -> &str {
        &self.key.platform
    }

    /// Discovery time: when the post was published, else when we collected it.
    pub fn first_seen(&self) -> DateTime<Utc> {
        self.posted_at.unwrap_or(self.collected_at)
    }
}

/// Output of one normalization pass with per-reason counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    pub items: Vec<CanonicalItem>,
    pub skipped_missing: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub age_flagged: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    /// Records older than this are skipped. `None` keeps everything.
    pub max_age_hours: Option<f64>,
}

impl Normalizer {
    pub fn new(max_age_hours: Option<f64>) -> Self {
        Self {
            max_age_hours: max_age_hours.filter(|h| *h > 0.0),
        }
    }

    /// First occurrence of a key wins; later duplicates are dropped and counted.
    pub fn normalize(&self, raw: Vec<RawRecord>) -> NormalizeReport {
        let mut report = NormalizeReport {
            items: Vec::with_capacity(raw.len()),
            ..Default::default()
        };
        let mut seen: HashSet<ItemKey> = HashSet::with_capacity(raw.len());

        for rec in raw {
            let content = normalize_text(&rec.content);
            if rec.platform.trim().is_empty() || rec.post_id.trim().is_empty() || content.is_empty()
            {
                report.skipped_missing += 1;
                continue;
            }

            // The first occurrence decides the key, even when it is dropped as stale.
            let key = ItemKey::new(&rec.platform, &rec.post_id);
            if !seen.insert(key.clone()) {
                report.duplicates += 1;
                continue;
            }

            let (age_hours, age_flagged) = age_hours(rec.posted_at, rec.collected_at);
            if let Some(max) = self.max_age_hours {
                if age_hours > max {
                    report.stale += 1;
                    continue;
                }
            }
            if age_flagged {
                report.age_flagged += 1;
            }

            report.items.push(CanonicalItem {
                key,
                match_text: content.to_lowercase(),
                content,
                url: rec.url.filter(|u| !u.trim().is_empty()),
                views: rec.views,
                likes: rec.likes,
                comments: rec.comments,
                shares: rec.shares,
                saves: rec.saves,
                country: rec
                    .country
                    .map(|c| c.trim().to_ascii_uppercase())
                    .filter(|c| !c.is_empty()),
                posted_at: rec.posted_at,
                collected_at: rec.collected_at,
                age_hours,
                age_flagged,
            });
        }

        report
    }
}

/// Convenience wrapper with no staleness cut-off.
pub fn normalize(raw: Vec<RawRecord>) -> NormalizeReport {
    Normalizer::default().normalize(raw)
}

/// Age in hours, clamped to 0 (and flagged) when missing or negative.
fn age_hours(posted: Option<DateTime<Utc>>, collected: DateTime<Utc>) -> (f64, bool) {
    match posted {
        Some(p) => {
            let hours = (collected - p).num_milliseconds() as f64 / 3_600_000.0;
            if hours.is_finite() && hours >= 0.0 {
                (hours, false)
            } else {
                (0.0, true)
            }
        }
        None => (0.0, true),
    }
}
