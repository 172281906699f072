// src/analyze/annotate.rs
//! Annotation collaborators: attach subject, category, sentiment and a viral-potential
//! estimate to canonical items.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyze::llm::{DynLlm, LlmError};
use crate::error::AnnotationError;
use crate::ingest::normalize::CanonicalItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "neutral" | "mixed" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

/// Canonical item joined with annotation attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedItem {
    pub item: CanonicalItem,
    /// Extracted subject name (display form). Empty when nothing was found.
    pub subject: String,
    pub category: String,
    pub sentiment: Sentiment,
    /// 0..=10
    pub viral_potential: f64,
    pub restaurant_applicable: bool,
}

#[async_trait]
pub trait AnnotationService: Send + Sync {
    /// Annotate one batch. Items whose annotation is malformed are left out of the
    /// result; a batch where nothing is usable fails with `InvalidResponse`.
    async fn annotate(&self, batch: &[CanonicalItem]) -> Result<Vec<AnnotatedItem>, AnnotationError>;
    fn name(&self) -> &'static str;
}

// ------------------------------------------------------------
// LLM-backed annotator
// ------------------------------------------------------------

const SYSTEM: &str = "You are a food and beverage trend analyst. \
Respond with JSON only, no prose.";

pub struct ClaudeAnnotator {
    llm: DynLlm,
}

impl ClaudeAnnotator {
    pub fn new(llm: DynLlm) -> Self {
        Self { llm }
    }

    fn prompt(batch: &[CanonicalItem]) -> String {
        let mut p = String::from(
            "For each numbered post below, extract the specific food or drink item it is about.\n\
             Return a JSON array with one object per post, in the same order, each with exactly:\n\
             \"index\" (the post number), \"item_name\" (specific name, e.g. \"Lavender Oat Milk Latte\"), \
             \"category\" (drink|pastry|snack|ingredient|main_dish|dessert|other), \
             \"sentiment\" (positive|neutral|negative), \"viral_potential\" (0-10), \
             \"restaurant_applicable\" (true if a cafe or restaurant could sell it).\n\n",
        );
        for (i, item) in batch.iter().enumerate() {
            let text: String = item.content.chars().take(500).collect();
            p.push_str(&format!("{i}. [{}] {}\n", item.platform(), text));
        }
        p
    }
}

fn map_llm_error(e: LlmError) -> AnnotationError {
    match e {
        e if e.is_transient() => AnnotationError::Service(e.to_string()),
        LlmError::Empty => AnnotationError::InvalidResponse(e.to_string()),
        other => AnnotationError::Rejected(other.to_string()),
    }
}

#[async_trait]
impl AnnotationService for ClaudeAnnotator {
    async fn annotate(&self, batch: &[CanonicalItem]) -> Result<Vec<AnnotatedItem>, AnnotationError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = Self::prompt(batch);
        let reply = self
            .llm
            .complete(SYSTEM, &prompt)
            .await
            .map_err(map_llm_error)?;
        let parsed = parse_annotations(&reply, batch);
        if parsed.is_err() {
            self.llm.invalidate(SYSTEM, &prompt);
        }
        parsed
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}

/// Models like to wrap JSON in ```json fences.
pub fn strip_code_fences(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a batch reply. Each object must carry all five fields with the right types;
/// anything else is dropped. An unparseable reply, or one with no valid object, is
/// `InvalidResponse`.
pub fn parse_annotations(
    reply: &str,
    batch: &[CanonicalItem],
) -> Result<Vec<AnnotatedItem>, AnnotationError> {
    let v: Value = serde_json::from_str(strip_code_fences(reply))
        .map_err(|e| AnnotationError::InvalidResponse(e.to_string()))?;
    let entries = match v {
        Value::Array(a) => a,
        obj @ Value::Object(_) if batch.len() == 1 => vec![obj],
        _ => return Err(AnnotationError::InvalidResponse("expected a JSON array".into())),
    };

    let mut out = Vec::with_capacity(entries.len());
    let mut taken = vec![false; batch.len()];
    for (pos, e) in entries.iter().enumerate() {
        let idx = match e.get("index") {
            Some(i) => i.as_u64().map(|i| i as usize),
            None => Some(pos),
        };
        let Some(idx) = idx.filter(|i| *i < batch.len() && !taken[*i]) else {
            continue;
        };
        let Some(parsed) = parse_one(e) else {
            tracing::debug!(target: "annotate", index = idx, "malformed annotation dropped");
            continue;
        };
        taken[idx] = true;
        out.push(AnnotatedItem {
            item: batch[idx].clone(),
            subject: parsed.0,
            category: parsed.1,
            sentiment: parsed.2,
            viral_potential: parsed.3,
            restaurant_applicable: parsed.4,
        });
    }

    if out.is_empty() {
        return Err(AnnotationError::InvalidResponse(
            "no well-formed annotations in reply".into(),
        ));
    }
    // Reply order is not trusted; keep batch order.
    out.sort_by_key(|a| batch.iter().position(|b| b.key == a.item.key));
    Ok(out)
}

fn parse_one(e: &Value) -> Option<(String, String, Sentiment, f64, bool)> {
    let name = e.get("item_name")?.as_str()?.trim().to_string();
    let category = e.get("category")?.as_str()?.trim().to_ascii_lowercase();
    let sentiment = Sentiment::parse(e.get("sentiment")?.as_str()?)?;
    let viral = e.get("viral_potential")?.as_f64()?;
    let applicable = e.get("restaurant_applicable")?.as_bool()?;
    if !viral.is_finite() {
        return None;
    }
    Some((name, category, sentiment, viral.clamp(0.0, 10.0), applicable))
}

// ------------------------------------------------------------
// Offline annotator
// ------------------------------------------------------------

static DRINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b((?:[a-z]+\s+){1,3})(latte|coffee|espresso|cappuccino|mocha|frappe|smoothie|juice|tea|drink|brew|matcha)\b",
    )
    .unwrap()
});
static TEMPERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(cold|iced|hot|warm)\s+([a-z]+)\b").unwrap());
static PASTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b((?:[a-z]+\s+){1,2})(croissant|muffin|scone|donut|cookie|cake|bun|pastry|toast)\b")
        .unwrap()
});
static DISH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b((?:[a-z]+\s+){1,2})(burger|ramen|taco|tacos|pasta|pizza|bowl|sandwich|salad|noodles)\b")
        .unwrap()
});
static INGREDIENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([a-z]+)\s+(milk|cream|syrup|sauce)\b").unwrap());

/// Modifier words that never start a subject name.
const STOP: &[&str] = &[
    "a", "an", "the", "my", "our", "your", "this", "that", "some", "new", "best", "try", "tried",
    "trying", "i", "we", "you", "love", "made", "making", "with", "and", "of", "for", "to", "is",
    "at", "in", "on", "viral", "perfect", "ultimate", "homemade", "easy", "how",
];

const POSITIVE: &[&str] = &["love", "best", "amazing", "delicious", "obsessed", "perfect", "good", "tasty"];
const NEGATIVE: &[&str] = &["worst", "bad", "gross", "awful", "hate", "disappointing", "overrated"];

/// Regex extraction with no external calls. Used when no model is configured and
/// under `AI_TEST_MODE=mock`.
#[derive(Debug, Clone, Default)]
pub struct HeuristicAnnotator;

impl HeuristicAnnotator {
    pub fn annotate_one(&self, item: &CanonicalItem) -> AnnotatedItem {
        let text = &item.match_text;
        let found = extract(&DRINK, text, "drink")
            .or_else(|| extract(&PASTRY, text, "pastry"))
            .or_else(|| extract(&DISH, text, "main_dish"))
            .or_else(|| {
                TEMPERED
                    .captures(text)
                    .filter(|c| !STOP.contains(&&c[2]))
                    .map(|c| (format!("{} {}", &c[1], &c[2]), "drink"))
            })
            .or_else(|| {
                INGREDIENT
                    .captures(text)
                    .filter(|c| !STOP.contains(&&c[1]))
                    .map(|c| (format!("{} {}", &c[1], &c[2]), "ingredient"))
            })
            .filter(|(name, _)| name.len() > 5);

        let (subject, category) = match found {
            Some((name, cat)) => (title_case(&name), cat.to_string()),
            None => (String::new(), "unknown".to_string()),
        };
        AnnotatedItem {
            item: item.clone(),
            restaurant_applicable: !subject.is_empty(),
            subject,
            category,
            sentiment: sentiment_of(text),
            viral_potential: viral_estimate(item),
        }
    }
}

#[async_trait]
impl AnnotationService for HeuristicAnnotator {
    async fn annotate(&self, batch: &[CanonicalItem]) -> Result<Vec<AnnotatedItem>, AnnotationError> {
        Ok(batch.iter().map(|i| self.annotate_one(i)).collect())
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

fn extract(re: &Regex, text: &str, category: &'static str) -> Option<(String, &'static str)> {
    re.captures_iter(text).find_map(|c| {
        let words: Vec<&str> = c[1]
            .split_whitespace()
            .skip_while(|w| STOP.contains(w))
            .collect();
        if words.is_empty() {
            return None;
        }
        Some((format!("{} {}", words.join(" "), &c[2]), category))
    })
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut cs = w.chars();
            match cs.next() {
                Some(f) => f.to_uppercase().chain(cs).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn sentiment_of(text: &str) -> Sentiment {
    let pos = POSITIVE.iter().filter(|w| text.contains(*w)).count();
    let neg = NEGATIVE.iter().filter(|w| text.contains(*w)).count();
    match pos.cmp(&neg) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

/// 0..=10 from reach: 2 points per order of magnitude of views (or likes).
fn viral_estimate(item: &CanonicalItem) -> f64 {
    let reach = item.views.or(item.likes).unwrap_or(0) as f64;
    ((reach + 1.0).log10() * 2.0).clamp(0.0, 10.0)
}
