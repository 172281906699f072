// src/ingest/config.rs
//! Vertical catalog: keyword lists and category filters per business vertical.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

const ENV_PATH: &str = "VERTICALS_PATH";

/// Keywords handed to the adapters and the annotation categories a vertical accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerticalConfig {
    pub name: String,
    pub keywords: Vec<String>,
    /// Empty means every category is accepted.
    pub categories: Vec<String>,
}

impl VerticalConfig {
    pub fn accepts_category(&self, category: &str) -> bool {
        self.categories.is_empty()
            || self
                .categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(category.trim()))
    }
}

#[derive(Debug, Deserialize)]
struct VerticalEntry {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
}

/// Name → config lookup; names are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerticalCatalog {
    verticals: BTreeMap<String, VerticalConfig>,
}

impl VerticalCatalog {
    pub fn new(list: Vec<VerticalConfig>) -> Self {
        let verticals = list
            .into_iter()
            .map(|mut v| {
                v.name = v.name.trim().to_ascii_lowercase();
                v.keywords = clean_list(v.keywords);
                v.categories = clean_list(v.categories);
                (v.name.clone(), v)
            })
            .filter(|(name, _)| !name.is_empty())
            .collect();
        Self { verticals }
    }

    /// Defaults for the verticals the service ships with.
    pub fn builtin() -> Self {
        fn v(name: &str, keywords: &[&str], categories: &[&str]) -> VerticalConfig {
            VerticalConfig {
                name: name.to_string(),
                keywords: keywords.iter().map(|s| s.to_string()).collect(),
                categories: categories.iter().map(|s| s.to_string()).collect(),
            }
        }
        Self::new(vec![
            v(
                "coffee",
                &[
                    "coffee",
                    "latte",
                    "espresso",
                    "cappuccino",
                    "cold brew",
                    "iced coffee",
                    "coffee shop",
                    "barista",
                    "coffee drink",
                    "specialty coffee",
                ],
                &["drink", "pastry", "snack", "ingredient"],
            ),
            v(
                "restaurant",
                &[
                    "restaurant", "food", "recipe", "cooking", "chef", "menu", "dining", "cuisine",
                    "dish", "meal",
                ],
                &[],
            ),
            v(
                "barbershop",
                &[
                    "barbershop",
                    "haircut",
                    "barber",
                    "hairstyle",
                    "men's hair",
                    "fade",
                    "beard",
                    "grooming",
                    "haircut style",
                ],
                &[],
            ),
        ])
    }

    /// Unknown verticals are a configuration error, reported before collection.
    pub fn lookup(&self, name: &str) -> Result<&VerticalConfig, PipelineError> {
        self.verticals
            .get(&name.trim().to_ascii_lowercase())
            .ok_or_else(|| PipelineError::Configuration(format!("unknown vertical '{name}'")))
    }

    pub fn names(&self) -> Vec<String> {
        self.verticals.keys().cloned().collect()
    }
}

/// Load the catalog from an explicit path. Supports TOML or JSON formats.
pub fn load_verticals_from(path: &Path) -> Result<VerticalCatalog> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading verticals from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_verticals(&content, ext.as_str())
}

/// Load the catalog using env var + fallbacks:
/// 1) $VERTICALS_PATH
/// 2) config/verticals.toml
/// 3) config/verticals.json
/// 4) built-in defaults
pub fn load_verticals_default() -> Result<VerticalCatalog> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_verticals_from(&pb);
        } else {
            return Err(anyhow!("VERTICALS_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/verticals.toml");
    if toml_p.exists() {
        return load_verticals_from(&toml_p);
    }
    let json_p = PathBuf::from("config/verticals.json");
    if json_p.exists() {
        return load_verticals_from(&json_p);
    }
    Ok(VerticalCatalog::builtin())
}

fn parse_verticals(s: &str, hint_ext: &str) -> Result<VerticalCatalog> {
    let entries: BTreeMap<String, VerticalEntry> = if hint_ext == "json" {
        serde_json::from_str(s).context("parsing verticals json")?
    } else {
        match toml::from_str(s) {
            Ok(v) => v,
            Err(toml_err) => serde_json::from_str(s)
                .map_err(|_| anyhow!("unsupported verticals format: {toml_err}"))?,
        }
    };
    if entries.is_empty() {
        return Err(anyhow!("verticals file defines no verticals"));
    }
    Ok(VerticalCatalog::new(
        entries
            .into_iter()
            .map(|(name, e)| VerticalConfig {
                name,
                keywords: e.keywords,
                categories: e.categories,
            })
            .collect(),
    ))
}

/// Trim, drop empties, dedup (case-insensitive), keep first-seen order.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_ascii_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}
