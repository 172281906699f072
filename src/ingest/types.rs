// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Platform identifiers used by the bundled adapters.
pub const TIKTOK: &str = "tiktok";
pub const INSTAGRAM: &str = "instagram";
pub const GOOGLE_TRENDS: &str = "google_trends";
pub const REDDIT: &str = "reddit";
pub const YOUTUBE: &str = "youtube";

/// One engagement record exactly as an adapter produced it.
///
/// Counters are optional because platforms expose different subsets
/// (Reddit has no views, Instagram no shares/saves, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    pub platform: String,
    pub post_id: String,
    pub content: String,
    pub url: Option<String>,
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub shares: Option<u64>,
    pub saves: Option<u64>,
    /// ISO country code (or free-form region) when the platform reports one.
    pub country: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
}

impl RawRecord {
    /// Minimal record; counters and metadata start empty.
    pub fn new(
        platform: impl Into<String>,
        post_id: impl Into<String>,
        content: impl Into<String>,
        collected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            platform: platform.into(),
            post_id: post_id.into(),
            content: content.into(),
            url: None,
            views: None,
            likes: None,
            comments: None,
            shares: None,
            saves: None,
            country: None,
            posted_at: None,
            collected_at,
        }
    }
}

/// Dedup identity of a post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub platform: String,
    pub post_id: String,
}

impl ItemKey {
    pub fn new(platform: &str, post_id: &str) -> Self {
        Self {
            platform: platform.trim().to_ascii_lowercase(),
            post_id: post_id.trim().to_string(),
        }
    }
}

/// A data source (one per platform). Implementations must not share mutable state.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn collect(&self, topic_keywords: &[String]) -> Result<Vec<RawRecord>, SourceError>;
    fn name(&self) -> &'static str;
}
