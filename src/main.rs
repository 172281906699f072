//! Trend Scout service entrypoint.
//! Boots the Axum HTTP server: pipeline state, `/run/{vertical}`, `/metrics`.

use shuttle_axum::ShuttleAxum;

use trend_scout::api::{self, AppState};
use trend_scout::config::PipelineConfig;
use trend_scout::metrics::Metrics;
use trend_scout::Pipeline;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    trend_scout::init_tracing();

    let config = PipelineConfig::load_default()?;
    let metrics = Metrics::init(config.top_n)?;
    let pipeline = Pipeline::from_env(config)?;
    tracing::info!(verticals = ?pipeline.catalog().names(), "pipeline ready");

    let router = api::router(AppState::new(pipeline)).merge(metrics.router());
    Ok(router.into())
}
