// src/analyze/trends.rs
//! Group annotated posts into trends (one per normalized subject name).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyze::annotate::{AnnotatedItem, Sentiment};
use crate::ingest::config::VerticalConfig;
use crate::ingest::normalize::CanonicalItem;

/// Subjects at least this close (normalized Levenshtein) count as competitors.
pub const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Comparison key for a subject name: lower-case, punctuation-trimmed words, leading
/// article dropped, single spaces.
pub fn subject_key(name: &str) -> String {
    let lowered = name.to_lowercase();
    lowered
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .skip_while(|w| matches!(*w, "the" | "a" | "an"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A logical subject aggregating one or more posts.
#[derive(Debug, Clone, Serialize)]
pub struct Trend {
    pub key: String,
    /// Display name, from the first post in the group.
    pub subject: String,
    pub category: String,
    pub sentiment: Sentiment,
    /// Mean over the group, 0..=10.
    pub viral_potential: f64,
    /// Other trends in the same batch with a similar subject.
    pub similar_items: usize,
    pub items: Vec<AnnotatedItem>,
}

impl Trend {
    /// Saturating sum of one counter over the posts that report it. `None` when no
    /// post in the group carries the counter.
    fn reported(&self, counter: fn(&CanonicalItem) -> Option<u64>) -> Option<u64> {
        self.items
            .iter()
            .filter_map(|a| counter(&a.item))
            .reduce(u64::saturating_add)
    }

    pub fn reported_views(&self) -> Option<u64> {
        self.reported(|i| i.views)
    }
    pub fn reported_likes(&self) -> Option<u64> {
        self.reported(|i| i.likes)
    }
    pub fn reported_comments(&self) -> Option<u64> {
        self.reported(|i| i.comments)
    }
    pub fn reported_shares(&self) -> Option<u64> {
        self.reported(|i| i.shares)
    }
    pub fn reported_saves(&self) -> Option<u64> {
        self.reported(|i| i.saves)
    }

    pub fn views(&self) -> u64 {
        self.reported_views().unwrap_or(0)
    }
    pub fn likes(&self) -> u64 {
        self.reported_likes().unwrap_or(0)
    }
    pub fn comments(&self) -> u64 {
        self.reported_comments().unwrap_or(0)
    }
    pub fn shares(&self) -> u64 {
        self.reported_shares().unwrap_or(0)
    }
    pub fn saves(&self) -> u64 {
        self.reported_saves().unwrap_or(0)
    }

    pub fn platforms(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .map(|a| a.item.platform().to_string())
            .collect()
    }

    pub fn countries(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .filter_map(|a| a.item.country.clone())
            .collect()
    }

    /// Age of the youngest post with a real timestamp. `None` when no post had one.
    pub fn min_age_hours(&self) -> Option<f64> {
        self.items
            .iter()
            .filter(|a| !a.item.age_flagged)
            .map(|a| a.item.age_hours)
            .reduce(f64::min)
    }

    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        self.items.iter().map(|a| a.item.first_seen()).min()
    }

    pub fn urls(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|a| a.item.url.clone())
            .collect()
    }
}

/// Outcome of grouping: trends in first-appearance order plus the number of
/// annotated posts that were filtered out.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    pub trends: Vec<Trend>,
    pub rejected: usize,
}

/// Keep applicable posts with a subject in one of the vertical's categories and group
/// them by `subject_key`. Similar-subject counts are filled in afterwards.
pub fn group_trends(annotated: Vec<AnnotatedItem>, vertical: &VerticalConfig) -> Grouping {
    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Vec<AnnotatedItem>> = BTreeMap::new();
    let mut rejected = 0usize;

    for a in annotated {
        let key = subject_key(&a.subject);
        if !a.restaurant_applicable || key.is_empty() || !vertical.accepts_category(&a.category) {
            rejected += 1;
            continue;
        }
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(a);
    }

    let mut trends: Vec<Trend> = order
        .into_iter()
        .filter_map(|key| {
            let items = groups.remove(&key)?;
            let head = items.first()?;
            let viral =
                items.iter().map(|a| a.viral_potential).sum::<f64>() / items.len() as f64;
            Some(Trend {
                subject: head.subject.trim().to_string(),
                category: head.category.clone(),
                sentiment: head.sentiment,
                viral_potential: viral,
                similar_items: 0,
                key,
                items,
            })
        })
        .collect();

    let similar = similar_counts(&trends);
    for (t, n) in trends.iter_mut().zip(similar) {
        t.similar_items = n;
    }

    Grouping { trends, rejected }
}

/// For each trend, how many other trends in the batch have a similar subject key.
pub fn similar_counts(trends: &[Trend]) -> Vec<usize> {
    trends
        .iter()
        .enumerate()
        .map(|(i, t)| {
            trends
                .iter()
                .enumerate()
                .filter(|(j, o)| {
                    *j != i && strsim::normalized_levenshtein(&t.key, &o.key) >= SIMILARITY_THRESHOLD
                })
                .count()
        })
        .collect()
}
