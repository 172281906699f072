//! Offline demo: runs the pipeline over the bundled fixtures with the heuristic
//! collaborators and prints the selection as JSON.
//!
//! Usage: `pipeline_demo [vertical] [fixtures dir]` (defaults: coffee, tests/fixtures).

use std::path::PathBuf;

use trend_scout::analyze::Collaborators;
use trend_scout::config::PipelineConfig;
use trend_scout::ingest::config::load_verticals_default;
use trend_scout::ingest::providers::fixture_adapters;
use trend_scout::Pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    trend_scout::init_tracing();

    let mut args = std::env::args().skip(1);
    let vertical = args.next().unwrap_or_else(|| "coffee".to_string());
    let dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures"));

    let config = PipelineConfig {
        // Fixtures carry fixed dates.
        max_age_hours: None,
        ..PipelineConfig::load_default()?
    };
    let pipeline = Pipeline::new(
        fixture_adapters(&dir)?,
        Collaborators::offline(),
        load_verticals_default()?,
        config,
    );

    let out = pipeline.run(&vertical).await?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
