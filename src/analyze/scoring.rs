//! Universal Trend Score.
//!
//! ```text
//! UTS = scale( (V * M * E * G * P) / (T * C) )
//! ```
//!
//! V, M, E, G, P are each in [0,100]; T and C are divisors >= 1. `scale` maps the raw
//! product onto [0,100] with a fixed log scale between `RAW_FLOOR` and `RAW_CAP`, so
//! scores from different runs are comparable. Everything here is pure: same inputs,
//! bit-identical output.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyze::annotate::Sentiment;
use crate::analyze::trends::Trend;

/// Hours between the two velocity samples.
pub const VELOCITY_WINDOW_HOURS: f64 = 6.0;
/// Momentum uses at most this many points.
pub const MOMENTUM_POINTS: usize = 5;
/// Neutral value for components that cannot be computed from the data at hand.
pub const NEUTRAL: f64 = 50.0;
/// Countries in the world, for geographic spread.
pub const WORLD_COUNTRIES: f64 = 195.0;
pub const MAX_PLATFORMS: usize = 10;
/// Raw values at or below this score 0.
pub const RAW_FLOOR: f64 = 1.0;
/// Raw values at or above this score 100 (= 100^5, five maxed components).
pub const RAW_CAP: f64 = 1e10;

/// Batch-wide aggregates the per-trend components normalize against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoringContext {
    /// Largest velocity (views/hour) in the batch.
    pub max_velocity: f64,
}

impl ScoringContext {
    /// Build from each trend's current views and its history window.
    pub fn from_batch<'a>(inputs: impl IntoIterator<Item = (&'a Trend, &'a [f64])>) -> Self {
        let max_velocity = inputs
            .into_iter()
            .filter_map(|(t, h)| velocity(t.reported_views()? as f64, h))
            .fold(0.0, f64::max);
        Self { max_velocity }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreComponents {
    pub velocity: f64,
    pub momentum: f64,
    pub engagement: f64,
    pub geographic: f64,
    pub platform: f64,
    pub time_decay: f64,
    pub competition: f64,
}

impl ScoreComponents {
    pub fn raw(&self) -> f64 {
        (self.velocity * self.momentum * self.engagement * self.geographic * self.platform)
            / (self.time_decay * self.competition)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredTrend {
    pub subject: String,
    pub subject_key: String,
    pub category: String,
    pub sentiment: Sentiment,
    pub viral_potential: f64,
    pub views: u64,
    pub platforms: Vec<String>,
    pub countries: Vec<String>,
    pub first_seen: Option<DateTime<Utc>>,
    pub post_count: usize,
    pub urls: Vec<String>,
    pub components: ScoreComponents,
    pub uts: f64,
}

/// Views per hour since the newest history point; `None` without history.
pub fn velocity(views_now: f64, historical: &[f64]) -> Option<f64> {
    let before = *historical.last()?;
    Some(((views_now - before) / VELOCITY_WINDOW_HOURS).max(0.0))
}

/// Neutral when the trend reports no views at all.
fn velocity_score(views_now: Option<f64>, historical: &[f64], ctx: &ScoringContext) -> f64 {
    let Some(views_now) = views_now else {
        return NEUTRAL;
    };
    match velocity(views_now, historical) {
        None => NEUTRAL,
        Some(_) if ctx.max_velocity <= 0.0 => 0.0,
        Some(v) => (v / ctx.max_velocity * 100.0).clamp(0.0, 100.0),
    }
}

/// Mean period-over-period growth over the last points of history + now.
/// 0% growth maps to 50, +100% to 100, -100% to 0.
fn momentum_score(views_now: Option<f64>, historical: &[f64]) -> f64 {
    let Some(views_now) = views_now else {
        return NEUTRAL;
    };
    let mut series: Vec<f64> = historical.to_vec();
    series.push(views_now);
    let start = series.len().saturating_sub(MOMENTUM_POINTS);
    let window = &series[start..];

    let rates: Vec<f64> = window
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if rates.is_empty() {
        return NEUTRAL;
    }
    let mean = rates.iter().sum::<f64>() / rates.len() as f64;
    ((mean * 100.0 + 100.0) / 2.0).clamp(0.0, 100.0)
}

/// Weighted interactions per view. Reported zero views score 0; missing views or a
/// post set that reports none of comments, shares and saves is neutral.
fn engagement_score(
    views: Option<u64>,
    comments: Option<u64>,
    shares: Option<u64>,
    saves: Option<u64>,
) -> f64 {
    let views = match views {
        Some(0) => return 0.0,
        Some(v) => v,
        None => return NEUTRAL,
    };
    if comments.is_none() && shares.is_none() && saves.is_none() {
        return NEUTRAL;
    }
    let weighted = comments.unwrap_or(0) as f64 * 3.0
        + shares.unwrap_or(0) as f64 * 5.0
        + saves.unwrap_or(0) as f64 * 7.0;
    (weighted / views as f64 * 100.0).min(100.0)
}

/// Unknown geography counts as a single country.
fn geographic_score(countries: usize) -> f64 {
    let n = countries.max(1) as f64;
    ((n + 1.0).log2() / WORLD_COUNTRIES.log2() * 100.0).min(100.0)
}

fn platform_score(platforms: usize) -> f64 {
    platforms.min(MAX_PLATFORMS) as f64 * 100.0 / MAX_PLATFORMS as f64
}

fn time_decay(age_hours: Option<f64>) -> f64 {
    let age = age_hours.filter(|a| a.is_finite()).unwrap_or(0.0).max(0.0);
    (1.0 + (age / 24.0) * 0.1).clamp(1.0, 100.0)
}

fn competition(similar: usize) -> f64 {
    (1.0 + (similar as f64 + 1.0).log10()).clamp(1.0, 100.0)
}

/// Fixed, run-independent log scale onto [0,100].
pub fn scale_raw(raw: f64) -> f64 {
    if !raw.is_finite() || raw <= RAW_FLOOR {
        return 0.0;
    }
    (100.0 * (raw / RAW_FLOOR).log10() / (RAW_CAP / RAW_FLOOR).log10()).clamp(0.0, 100.0)
}

/// Score one trend. `historical` is its view-total history, oldest first.
pub fn score(trend: &Trend, historical: &[f64], ctx: &ScoringContext) -> ScoredTrend {
    let reported_views = trend.reported_views();
    let views = reported_views.unwrap_or(0);
    let views_now = reported_views.map(|v| v as f64);
    let platforms = trend.platforms();
    let countries = trend.countries();
    let age = trend.min_age_hours();

    let components = ScoreComponents {
        velocity: velocity_score(views_now, historical, ctx),
        momentum: momentum_score(views_now, historical),
        engagement: engagement_score(
            reported_views,
            trend.reported_comments(),
            trend.reported_shares(),
            trend.reported_saves(),
        ),
        geographic: geographic_score(countries.len()),
        platform: platform_score(platforms.len()),
        time_decay: time_decay(age),
        competition: competition(trend.similar_items),
    };

    let interactions = [trend.likes(), trend.comments(), trend.shares(), trend.saves()]
        .into_iter()
        .fold(0u64, u64::saturating_add);
    let no_signal = views == 0 && interactions == 0 && age.is_none();
    let uts = if no_signal {
        0.0
    } else {
        scale_raw(components.raw())
    };

    ScoredTrend {
        subject: trend.subject.clone(),
        subject_key: trend.key.clone(),
        category: trend.category.clone(),
        sentiment: trend.sentiment,
        viral_potential: trend.viral_potential,
        views,
        platforms: platforms.into_iter().collect(),
        countries: countries.into_iter().collect(),
        first_seen: trend.first_seen(),
        post_count: trend.items.len(),
        urls: trend.urls(),
        components,
        uts,
    }
}

/// Score a batch in input order, building the context from the same inputs.
pub fn score_batch(trends: &[Trend], histories: &[Vec<f64>]) -> Vec<ScoredTrend> {
    fn hist(histories: &[Vec<f64>], i: usize) -> &[f64] {
        histories.get(i).map(Vec::as_slice).unwrap_or(&[])
    }
    let ctx = ScoringContext::from_batch(
        trends
            .iter()
            .enumerate()
            .map(|(i, t)| (t, hist(histories, i))),
    );
    trends
        .iter()
        .enumerate()
        .map(|(i, t)| score(t, hist(histories, i), &ctx))
        .collect()
}
