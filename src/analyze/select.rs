// src/analyze/select.rs
//! Top-N selection with a total, deterministic ordering.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyze::scoring::ScoredTrend;

pub const DEFAULT_TOP_N: usize = 3;

/// Items surviving each stage of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub collected: usize,
    /// Dropped by the cross-run seen cache.
    pub previously_seen: usize,
    pub deduplicated: usize,
    pub skipped_missing: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub annotation_batches_dropped: usize,
    pub annotated: usize,
    /// Annotated but not applicable, no subject, or outside the vertical's categories.
    pub rejected: usize,
    pub scored: usize,
}

/// Ordered top-N of one run. Built once by [`select_top`]; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionResult {
    vertical: String,
    generated_at: DateTime<Utc>,
    counts: StageCounts,
    trends: Vec<ScoredTrend>,
}

impl SelectionResult {
    pub fn vertical(&self) -> &str {
        &self.vertical
    }
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
    pub fn counts(&self) -> &StageCounts {
        &self.counts
    }
    pub fn trends(&self) -> &[ScoredTrend] {
        &self.trends
    }
    pub fn len(&self) -> usize {
        self.trends.len()
    }
    pub fn is_empty(&self) -> bool {
        self.trends.is_empty()
    }
}

/// UTS desc, then engagement desc, then earlier first-seen, then subject name.
/// Trends without a first-seen time sort after dated ones.
pub fn rank_order(a: &ScoredTrend, b: &ScoredTrend) -> Ordering {
    b.uts
        .total_cmp(&a.uts)
        .then_with(|| b.components.engagement.total_cmp(&a.components.engagement))
        .then_with(|| match (a.first_seen, b.first_seen) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.subject.cmp(&b.subject))
}

/// Rank and keep the best `n`. Fewer qualifying trends means a shorter result, never
/// padding.
pub fn select_top(
    mut scored: Vec<ScoredTrend>,
    n: usize,
    vertical: &str,
    generated_at: DateTime<Utc>,
    counts: StageCounts,
) -> SelectionResult {
    scored.sort_by(rank_order);
    scored.truncate(n);
    SelectionResult {
        vertical: vertical.to_string(),
        generated_at,
        counts,
        trends: scored,
    }
}
