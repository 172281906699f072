// tests/providers.rs
use std::path::Path;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use trend_scout::ingest::collect_all;
use trend_scout::ingest::normalize::normalize;
use trend_scout::ingest::providers::{
    fixture_adapters, google_trends::GoogleTrendsAdapter, instagram::InstagramAdapter,
    reddit::RedditAdapter, tiktok::TikTokAdapter, youtube::YouTubeAdapter,
};

const TIKTOK: &str = include_str!("fixtures/tiktok.json");
const INSTAGRAM: &str = include_str!("fixtures/instagram.json");
const TRENDS: &str = include_str!("fixtures/google_trends.xml");
const REDDIT: &str = include_str!("fixtures/reddit.json");
const YOUTUBE: &str = include_str!("fixtures/youtube.json");

#[test]
fn tiktok_fixture_maps_counters() {
    let recs = TikTokAdapter::parse_items(TIKTOK, Utc::now()).unwrap();
    assert_eq!(recs.len(), 4);
    let r = &recs[0];
    assert_eq!(r.platform, "tiktok");
    assert_eq!(r.post_id, "7401000000000000001");
    assert_eq!(r.views, Some(8_000));
    assert_eq!(r.comments, Some(200));
    assert_eq!(r.shares, Some(100));
    assert_eq!(r.saves, Some(0));
    assert_eq!(r.country.as_deref(), Some("US"));
    assert_eq!(r.posted_at.unwrap().timestamp(), 1_740_801_600);
    // Numeric strings with separators.
    assert_eq!(recs[1].views, Some(3_500));
}

#[test]
fn instagram_fixture_falls_back_to_short_code_and_play_count() {
    let recs = InstagramAdapter::parse_items(INSTAGRAM, Utc::now()).unwrap();
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].views, Some(4_000));
    assert_eq!(recs[1].post_id, "C9xMat2");
    assert_eq!(recs[1].views, Some(1_500));
    assert_eq!(
        recs[1].posted_at,
        Some(Utc.with_ymd_and_hms(2025, 3, 1, 2, 0, 0).unwrap())
    );
}

#[test]
fn google_trends_keeps_only_topic_searches() {
    let kw = vec!["latte".to_string()];
    let recs = GoogleTrendsAdapter::parse_feed(TRENDS, "US", &kw, Utc::now()).unwrap();
    let titles: Vec<&str> = recs.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(titles, vec!["lavender latte", "iced matcha latte"]);
    assert_eq!(recs[0].views, Some(20_000));
    assert_eq!(recs[1].views, Some(5_000));
    assert_eq!(recs[0].country.as_deref(), Some("US"));
    assert_eq!(
        recs[0].posted_at,
        Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
    );
    // Ids are stable across fetches.
    let again = GoogleTrendsAdapter::parse_feed(TRENDS, "US", &kw, Utc::now()).unwrap();
    assert_eq!(recs[0].post_id, again[0].post_id);
}

#[test]
fn reddit_and_youtube_fixtures_parse() {
    let reddit = RedditAdapter::parse_listing(REDDIT, Utc::now()).unwrap();
    assert_eq!(reddit.len(), 2);
    assert_eq!(reddit[0].likes, Some(845));
    assert_eq!(reddit[0].views, None);

    let yt = YouTubeAdapter::parse_videos(YOUTUBE, Utc::now()).unwrap();
    assert_eq!(yt.len(), 2);
    assert_eq!(yt[0].views, Some(15_000));
    assert_eq!(yt[0].comments, Some(75));
}

#[tokio::test]
async fn fixture_adapters_collect_in_registration_order() {
    let adapters = fixture_adapters(Path::new("tests/fixtures")).unwrap();
    let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
    assert_eq!(
        names,
        vec!["tiktok", "instagram", "google_trends", "reddit", "youtube"]
    );

    let kw = vec!["latte".to_string()];
    let (raw, reports) = collect_all(&adapters, &kw, Duration::from_secs(5)).await;
    assert_eq!(reports.len(), 5);
    assert!(reports.iter().all(|r| r.error.is_none()));
    assert_eq!(raw.len(), 4 + 2 + 2 + 2 + 2);
    assert_eq!(raw[0].platform, "tiktok");

    // Duplicate TikTok row and the id-less row are dropped.
    let out = normalize(raw);
    assert_eq!(out.duplicates, 1);
    assert_eq!(out.skipped_missing, 1);
    assert_eq!(out.items.len(), 10);
}
