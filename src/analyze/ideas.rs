// src/analyze/ideas.rs
//! Idea generation: turn a selected trend into a sellable menu item.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analyze::annotate::strip_code_fences;
use crate::analyze::llm::DynLlm;
use crate::analyze::scoring::ScoredTrend;
use crate::error::GenerationError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessIdea {
    pub recipe_instructions: String,
    pub ingredients: Vec<String>,
    pub equipment_needed: Vec<String>,
    pub suggested_price: f64,
    pub cost_estimate: f64,
    pub margin_percent: f64,
    /// Human-readable, e.g. "$6,880/month".
    pub roi_projection: String,
    pub marketing_caption: String,
    pub hashtags: Vec<String>,
}

impl BusinessIdea {
    /// Empty idea returned when generation failed.
    pub fn placeholder() -> Self {
        Self::default()
    }
}

/// Selected trend with its idea. `placeholder` is set when generation failed and
/// `idea` is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdeaOutcome {
    pub subject: String,
    pub idea: BusinessIdea,
    pub placeholder: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait IdeaGenerationService: Send + Sync {
    async fn generate(&self, trend: &ScoredTrend) -> Result<BusinessIdea, GenerationError>;
    fn name(&self) -> &'static str;
}

// ------------------------------------------------------------
// LLM-backed generator
// ------------------------------------------------------------

const SYSTEM: &str = "You are a cafe and restaurant business consultant. Respond with JSON only.";

pub struct ClaudeIdeaGenerator {
    llm: DynLlm,
}

impl ClaudeIdeaGenerator {
    pub fn new(llm: DynLlm) -> Self {
        Self { llm }
    }

    fn prompt(t: &ScoredTrend) -> String {
        format!(
            "Trending item: \"{}\" (category: {}, trend score {:.1}/100, seen on {}).\n\
             Write a business idea for a small independent shop as one JSON object with exactly these fields:\n\
             \"recipe_instructions\" (string, numbered steps), \"ingredients\" (array of strings), \
             \"equipment_needed\" (array of strings), \"suggested_price\" (USD number), \
             \"cost_estimate\" (USD number per serving), \"margin_percent\" (number), \
             \"roi_projection\" (string like \"$6,880/month\"), \"marketing_caption\" (Instagram caption), \
             \"hashtags\" (array of strings starting with #).",
            t.subject,
            t.category,
            t.uts,
            t.platforms.join(", ")
        )
    }
}

#[async_trait]
impl IdeaGenerationService for ClaudeIdeaGenerator {
    async fn generate(&self, trend: &ScoredTrend) -> Result<BusinessIdea, GenerationError> {
        let prompt = Self::prompt(trend);
        let reply = self
            .llm
            .complete(SYSTEM, &prompt)
            .await
            .map_err(|e| GenerationError(e.to_string()))?;
        let parsed = parse_idea(&reply);
        if parsed.is_err() {
            self.llm.invalidate(SYSTEM, &prompt);
        }
        parsed
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}

/// Strict parse: every field must be present. Margin is recomputed from price and
/// cost when the model leaves it at zero.
pub fn parse_idea(reply: &str) -> Result<BusinessIdea, GenerationError> {
    let mut idea: BusinessIdea = serde_json::from_str(strip_code_fences(reply))
        .map_err(|e| GenerationError(format!("malformed idea: {e}")))?;
    if idea.recipe_instructions.trim().is_empty() {
        return Err(GenerationError("idea without recipe".into()));
    }
    if idea.margin_percent == 0.0 && idea.suggested_price > 0.0 {
        idea.margin_percent = margin(idea.suggested_price, idea.cost_estimate);
    }
    Ok(idea)
}

fn margin(price: f64, cost: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    ((price - cost) / price * 100.0 * 10.0).round() / 10.0
}

// ------------------------------------------------------------
// Offline generator
// ------------------------------------------------------------

/// Servings per day assumed for the ROI projection.
const DAILY_SERVINGS: f64 = 20.0;

/// Deterministic template ideas, no external calls.
#[derive(Debug, Clone, Default)]
pub struct TemplateIdeaGenerator;

impl TemplateIdeaGenerator {
    pub fn idea_for(trend: &ScoredTrend) -> BusinessIdea {
        let (price, cost_ratio, equipment): (f64, f64, &[&str]) = match trend.category.as_str() {
            "drink" => (5.5, 0.28, &["espresso machine", "milk frother", "blender"]),
            "pastry" | "dessert" => (4.25, 0.32, &["convection oven", "stand mixer"]),
            "snack" => (3.5, 0.3, &["prep station"]),
            "main_dish" => (12.0, 0.35, &["flat-top grill", "prep station"]),
            _ => (6.0, 0.33, &["prep station"]),
        };
        let cost = (price * cost_ratio * 100.0).round() / 100.0;
        let monthly = ((price - cost) * DAILY_SERVINGS * 30.0).round() as u64;

        let ingredients: Vec<String> = trend
            .subject
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        let tag = trend
            .subject
            .split_whitespace()
            .collect::<String>();

        BusinessIdea {
            recipe_instructions: format!(
                "1. Prep the base for the {s}.\n2. Combine {i}.\n3. Finish, plate and photograph for social.",
                s = trend.subject,
                i = ingredients.join(", ")
            ),
            ingredients,
            equipment_needed: equipment.iter().map(|e| e.to_string()).collect(),
            suggested_price: price,
            cost_estimate: cost,
            margin_percent: margin(price, cost),
            roi_projection: format!("${}/month", thousands(monthly)),
            marketing_caption: format!(
                "The {} everyone is talking about is now on our menu. Come try it today!",
                trend.subject
            ),
            hashtags: vec![
                format!("#{tag}"),
                format!("#{}", trend.category.replace('_', "")),
                "#trending".to_string(),
            ],
        }
    }
}

#[async_trait]
impl IdeaGenerationService for TemplateIdeaGenerator {
    async fn generate(&self, trend: &ScoredTrend) -> Result<BusinessIdea, GenerationError> {
        if trend.subject.trim().is_empty() {
            return Err(GenerationError("trend without subject".into()));
        }
        Ok(Self::idea_for(trend))
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

fn thousands(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, ch) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
