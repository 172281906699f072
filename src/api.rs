// src/api.rs
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::PipelineError;
use crate::pipeline::{Pipeline, RunOutput};
use crate::sink::MemorySink;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    latest: Arc<MemorySink>,
}

impl AppState {
    /// Wraps the pipeline and registers an in-memory sink for `/runs/latest`.
    pub fn new(pipeline: Pipeline) -> Self {
        let latest = Arc::new(MemorySink::with_capacity(10));
        let pipeline = pipeline.with_sink(latest.clone());
        Self {
            pipeline: Arc::new(pipeline),
            latest,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/verticals", get(verticals))
        .route("/run/{vertical}", post(run_vertical))
        .route("/runs/latest", get(latest_run))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn verticals(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.pipeline.catalog().names())
}

#[derive(Debug, Deserialize)]
struct RunParams {
    #[serde(default)]
    top_n: Option<usize>,
}

async fn run_vertical(
    State(state): State<AppState>,
    Path(vertical): Path<String>,
    Query(params): Query<RunParams>,
) -> Result<Json<RunOutput>, ApiError> {
    let out = state
        .pipeline
        .run_with(&vertical, params.top_n, Default::default())
        .await?;
    Ok(Json(out))
}

async fn latest_run(State(state): State<AppState>) -> Json<Option<RunOutput>> {
    Json(state.latest.latest())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    error: String,
}

/// Fatal run errors mapped onto HTTP statuses.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            PipelineError::Configuration(_) => (StatusCode::BAD_REQUEST, "configuration"),
            PipelineError::AllSourcesFailed { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "all_sources_failed")
            }
            PipelineError::EmptyResult { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "empty_result"),
            PipelineError::DeadlineExceeded(_) => (StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded"),
            PipelineError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
        };
        let body = ErrorBody {
            kind,
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
