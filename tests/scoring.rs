// tests/scoring.rs
use chrono::{DateTime, Duration, TimeZone, Utc};
use trend_scout::analyze::annotate::{AnnotatedItem, Sentiment};
use trend_scout::analyze::scoring::{score, score_batch, ScoringContext};
use trend_scout::analyze::select::{select_top, StageCounts};
use trend_scout::analyze::trends::{group_trends, Trend};
use trend_scout::ingest::config::{VerticalCatalog, VerticalConfig};
use trend_scout::ingest::normalize::normalize;
use trend_scout::ingest::types::RawRecord;

fn collected() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

struct Post<'a> {
    platform: &'a str,
    id: &'a str,
    subject: &'a str,
    category: &'a str,
    views: u64,
    comments: u64,
    shares: u64,
    age_h: i64,
}

fn annotated(p: Post<'_>) -> AnnotatedItem {
    let mut r = RawRecord::new(p.platform, p.id, format!("{} post", p.subject), collected());
    r.views = Some(p.views);
    r.comments = Some(p.comments);
    r.shares = Some(p.shares);
    r.country = Some("US".into());
    r.posted_at = Some(collected() - Duration::hours(p.age_h));
    AnnotatedItem {
        item: normalize(vec![r]).items.remove(0),
        subject: p.subject.into(),
        category: p.category.into(),
        sentiment: Sentiment::Positive,
        viral_potential: 7.0,
        restaurant_applicable: true,
    }
}

fn coffee() -> VerticalConfig {
    VerticalCatalog::builtin().lookup("coffee").unwrap().clone()
}

fn lavender_batch() -> Vec<Trend> {
    let lav = "Lavender Oat Milk Latte";
    let posts = vec![
        Post { platform: "tiktok", id: "t1", subject: lav, category: "drink", views: 6_000, comments: 150, shares: 100, age_h: 4 },
        Post { platform: "tiktok", id: "t2", subject: lav, category: "drink", views: 2_000, comments: 50, shares: 0, age_h: 5 },
        Post { platform: "instagram", id: "i1", subject: lav, category: "drink", views: 4_000, comments: 100, shares: 50, age_h: 6 },
        Post { platform: "tiktok", id: "t3", subject: "Lavender Latte", category: "drink", views: 1_000, comments: 5, shares: 0, age_h: 10 },
        Post { platform: "instagram", id: "i2", subject: "Lavender Oat Latte", category: "drink", views: 800, comments: 4, shares: 0, age_h: 12 },
        Post { platform: "youtube", id: "y1", subject: "Pumpkin Spice Cold Brew", category: "drink", views: 3_000, comments: 6, shares: 2, age_h: 20 },
        Post { platform: "reddit", id: "r1", subject: "Matcha Croissant", category: "pastry", views: 500, comments: 2, shares: 0, age_h: 30 },
    ];
    group_trends(posts.into_iter().map(annotated).collect(), &coffee()).trends
}

#[test]
fn lavender_scenario_scores_in_band_and_ranks_first() {
    let trends = lavender_batch();
    assert_eq!(trends.len(), 5);
    let lav = &trends[0];
    assert_eq!(lav.views(), 12_000);
    assert_eq!(lav.comments(), 300);
    assert_eq!(lav.shares(), 150);
    assert_eq!(lav.similar_items, 2);

    // 10,000 views six hours ago; competitors have no history.
    let histories = vec![vec![10_000.0], vec![], vec![], vec![], vec![]];
    let scored = score_batch(&trends, &histories);

    let uts = scored[0].uts;
    assert!((60.0..=85.0).contains(&uts), "lavender uts {uts}");
    for other in &scored[1..] {
        assert!(other.uts < 60.0, "{} scored {}", other.subject, other.uts);
    }

    let c = &scored[0].components;
    assert_eq!(c.velocity, 100.0);
    assert!((c.momentum - 60.0).abs() < 1e-9);
    assert!((c.engagement - 13.75).abs() < 1e-9);
    assert_eq!(c.platform, 20.0);

    let top = select_top(scored, 3, "coffee", collected(), StageCounts::default());
    assert_eq!(top.len(), 3);
    assert_eq!(top.trends()[0].subject, "Lavender Oat Milk Latte");
}

#[test]
fn scoring_is_bit_identical_on_repeat() {
    let trends = lavender_batch();
    let hist = [9_000.0, 9_500.0, 10_000.0];
    let ctx = ScoringContext::from_batch(trends.iter().map(|t| (t, &hist[..])));
    let a = score(&trends[0], &hist, &ctx);
    let b = score(&trends[0], &hist, &ctx);
    assert_eq!(a.uts.to_bits(), b.uts.to_bits());
    assert_eq!(a.components.momentum.to_bits(), b.components.momentum.to_bits());
    assert_eq!(a.components.competition.to_bits(), b.components.competition.to_bits());
    assert_eq!(a, b);
}

#[test]
fn components_stay_in_bounds() {
    let extremes = [
        (0u64, 0u64, 0u64, 0i64),
        (1, 1_000_000, 1_000_000, 0),
        (u32::MAX as u64, 5, 5, 10_000),
        (10, 0, 0, -3),
    ];
    let histories: [&[f64]; 4] = [&[], &[0.0, 0.0], &[1e12, 1.0, 1e12], &[5.0, 1.0, 2.0, 3.0, 4.0, 5.0]];
    for (i, (views, comments, shares, age)) in extremes.into_iter().enumerate() {
        let trend = group_trends(
            vec![annotated(Post {
                platform: "tiktok",
                id: "x",
                subject: "Cold Brew",
                category: "drink",
                views,
                comments,
                shares,
                age_h: age,
            })],
            &coffee(),
        )
        .trends
        .remove(0);
        for hist in histories {
            let ctx = ScoringContext::from_batch([(&trend, hist)]);
            let s = score(&trend, hist, &ctx);
            let c = s.components;
            for v in [c.velocity, c.momentum, c.engagement, c.geographic, c.platform] {
                assert!((0.0..=100.0).contains(&v), "case {i}: {c:?}");
            }
            assert!(c.time_decay >= 1.0 && c.time_decay <= 100.0);
            assert!(c.competition >= 1.0 && c.competition <= 100.0);
            assert!((0.0..=100.0).contains(&s.uts));
        }
    }
}

#[test]
fn engagement_never_drops_when_a_counter_grows() {
    let mut last = -1.0;
    for comments in (0..=400).step_by(25) {
        let trend = group_trends(
            vec![annotated(Post {
                platform: "tiktok",
                id: "m",
                subject: "Iced Mocha",
                category: "drink",
                views: 1_000,
                comments,
                shares: 3,
                age_h: 2,
            })],
            &coffee(),
        )
        .trends
        .remove(0);
        let e = score(&trend, &[], &ScoringContext::default()).components.engagement;
        assert!(e >= last, "E fell from {last} to {e} at {comments} comments");
        last = e;
    }
}

#[test]
fn completely_empty_trend_scores_zero() {
    let raw = RawRecord::new("reddit", "e", "empty post", collected());
    let item = AnnotatedItem {
        item: normalize(vec![raw]).items.remove(0),
        subject: "Oat Latte".into(),
        category: "drink".into(),
        sentiment: Sentiment::Neutral,
        viral_potential: 0.0,
        restaurant_applicable: true,
    };
    let trend = group_trends(vec![item], &coffee()).trends.remove(0);
    let s = score(&trend, &[], &ScoringContext::default());
    assert_eq!(s.uts, 0.0);
    assert_eq!(s.components.engagement, 50.0);
}

fn single_source_trend(raw: RawRecord, subject: &str) -> Trend {
    let item = AnnotatedItem {
        item: normalize(vec![raw]).items.remove(0),
        subject: subject.into(),
        category: "drink".into(),
        sentiment: Sentiment::Positive,
        viral_potential: 6.0,
        restaurant_applicable: true,
    };
    group_trends(vec![item], &coffee()).trends.remove(0)
}

#[test]
fn reddit_trend_without_views_still_scores() {
    let mut r = RawRecord::new("reddit", "r1", "lavender latte thread", collected());
    r.likes = Some(5_000);
    r.comments = Some(900);
    r.posted_at = Some(collected() - Duration::hours(3));
    let trend = single_source_trend(r, "Lavender Latte");

    let s = score(&trend, &[], &ScoringContext::default());
    assert_eq!(s.components.engagement, 50.0);
    assert_eq!(s.components.velocity, 50.0);
    assert_eq!(s.components.momentum, 50.0);
    assert!(s.uts > 0.0, "uts {}", s.uts);
}

#[test]
fn google_trends_search_without_interactions_still_scores() {
    let mut r = RawRecord::new("google_trends", "g1", "lavender latte", collected());
    r.views = Some(200_000);
    r.country = Some("US".into());
    r.posted_at = Some(collected() - Duration::hours(8));
    let trend = single_source_trend(r, "Lavender Latte");

    let s = score(&trend, &[], &ScoringContext::default());
    assert_eq!(s.components.engagement, 50.0);
    assert_eq!(s.views, 200_000);
    assert!(s.uts > 0.0, "uts {}", s.uts);
}

#[test]
fn huge_counters_saturate_instead_of_overflowing() {
    let big = u64::MAX / 2 + 1;
    let items: Vec<AnnotatedItem> = ["a", "b"]
        .into_iter()
        .map(|id| {
            let mut r = RawRecord::new("tiktok", id, "cold brew", collected());
            r.views = Some(big);
            r.likes = Some(big);
            r.comments = Some(big);
            r.shares = Some(big);
            r.posted_at = Some(collected() - Duration::hours(1));
            AnnotatedItem {
                item: normalize(vec![r]).items.remove(0),
                subject: "Cold Brew".into(),
                category: "drink".into(),
                sentiment: Sentiment::Neutral,
                viral_potential: 5.0,
                restaurant_applicable: true,
            }
        })
        .collect();
    let trend = group_trends(items, &coffee()).trends.remove(0);
    assert_eq!(trend.items.len(), 2);
    assert_eq!(trend.views(), u64::MAX);
    assert_eq!(trend.comments(), u64::MAX);

    let hist = [1.0];
    let ctx = ScoringContext::from_batch([(&trend, &hist[..])]);
    let s = score(&trend, &hist, &ctx);
    assert_eq!(s.views, u64::MAX);
    assert!((0.0..=100.0).contains(&s.uts), "uts {}", s.uts);
    assert!((0.0..=100.0).contains(&s.components.engagement));
}

#[test]
fn missing_geography_counts_as_one_country() {
    let with_geo = lavender_batch().remove(4);
    let mut no_geo_item = with_geo.items[0].clone();
    no_geo_item.item.country = None;
    let no_geo = group_trends(vec![no_geo_item], &coffee()).trends.remove(0);

    let ctx = ScoringContext::default();
    let a = score(&with_geo, &[], &ctx).components.geographic;
    let b = score(&no_geo, &[], &ctx).components.geographic;
    assert!(b > 0.0);
    assert_eq!(a, b);
}
