// src/analyze/mod.rs
//! Annotation → trend grouping → scoring → selection, plus the idea collaborators.

pub mod annotate;
pub mod ideas;
pub mod llm;
pub mod scoring;
pub mod select;
pub mod trends;

use std::sync::Arc;

// Re-export convenient types.
pub use crate::analyze::annotate::{
    AnnotatedItem, AnnotationService, ClaudeAnnotator, HeuristicAnnotator, Sentiment,
};
pub use crate::analyze::ideas::{
    BusinessIdea, ClaudeIdeaGenerator, IdeaGenerationService, IdeaOutcome, TemplateIdeaGenerator,
};
pub use crate::analyze::scoring::{score, ScoreComponents, ScoredTrend, ScoringContext};
pub use crate::analyze::select::{select_top, SelectionResult, StageCounts};
pub use crate::analyze::trends::{group_trends, subject_key, Trend};

use crate::config::llm::LlmConfig;

/// The two external collaborators a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub annotator: Arc<dyn AnnotationService>,
    pub ideas: Arc<dyn IdeaGenerationService>,
}

impl Collaborators {
    /// Deterministic offline pair (regex annotator, template ideas).
    pub fn offline() -> Self {
        Self {
            annotator: Arc::new(HeuristicAnnotator),
            ideas: Arc::new(TemplateIdeaGenerator),
        }
    }
}

/// LLM-backed collaborators sharing one budgeted client, or the offline pair when
/// the model is disabled, unconfigured, or `AI_TEST_MODE=mock`.
pub fn build_collaborators(cfg: &LlmConfig) -> Collaborators {
    if LlmConfig::mock_mode() {
        tracing::info!("AI_TEST_MODE=mock; using offline collaborators");
        return Collaborators::offline();
    }
    match llm::build_llm(cfg) {
        Some(client) => {
            tracing::info!(provider = client.provider_name(), model = %cfg.model, "llm collaborators enabled");
            Collaborators {
                annotator: Arc::new(ClaudeAnnotator::new(client.clone())),
                ideas: Arc::new(ClaudeIdeaGenerator::new(client)),
            }
        }
        None => Collaborators::offline(),
    }
}
