//! Error taxonomy for a pipeline run.
//!
//! Soft failures (`SourceError`, `AnnotationError`, `GenerationError`) are logged and
//! counted by the orchestrator; only `PipelineError` ever reaches the caller.

use thiserror::Error;

/// Failure of a single source adapter. Always soft.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("payload parse error: {0}")]
    Parse(String),
}

impl SourceError {
    /// Metric label for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Unavailable(_) => "unavailable",
            SourceError::RateLimited(_) => "rate_limited",
            SourceError::Timeout(_) => "timeout",
            SourceError::Parse(_) => "parse",
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(429) {
            SourceError::RateLimited(err.to_string())
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

/// Failure of one annotation batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnnotationError {
    /// Transport or upstream failure; retried with backoff.
    #[error("annotation service error: {0}")]
    Service(String),

    /// Malformed structured output; dropped without retry.
    #[error("invalid annotation response: {0}")]
    InvalidResponse(String),

    #[error("annotation timed out after {0} ms")]
    Timeout(u64),

    /// Service refused the work outright (disabled, budget exhausted).
    #[error("annotation rejected: {0}")]
    Rejected(String),
}

impl AnnotationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnnotationError::Service(_) | AnnotationError::Timeout(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("idea generation failed: {0}")]
pub struct GenerationError(pub String);

/// Run-level failures. Anything else degrades the run instead of aborting it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("all {attempted} sources failed or returned no usable records")]
    AllSourcesFailed { attempted: usize },

    #[error("no items left to score after {stage}")]
    EmptyResult { stage: &'static str },

    #[error("run deadline of {0} ms exceeded")]
    DeadlineExceeded(u64),

    #[error("run cancelled by caller")]
    Cancelled,
}
