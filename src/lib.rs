// src/lib.rs
// Public library surface for the binary, the demo, and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod sink;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::error::{AnnotationError, GenerationError, PipelineError, SourceError};
pub use crate::pipeline::{Pipeline, RunOutput};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter;
/// `LOG_FORMAT=json` switches to JSON lines. A second call is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trend_scout=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    // Shuttle may have installed its own subscriber already.
    let _ = res;
}
