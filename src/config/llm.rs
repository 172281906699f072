// src/config/llm.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::{env, fs, path::Path};

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_daily_limit() -> u32 {
    200
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/llm")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    /// "claude" (case-insensitive)
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// "ENV" means: read from ANTHROPIC_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "claude".to_string(),
            model: default_model(),
            daily_limit: default_daily_limit(),
            api_key: String::new(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl LlmConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: LlmConfig = serde_json::from_str(&data)?;

        // Normalize provider
        cfg.provider = cfg.provider.trim().to_lowercase();

        // Resolve api key if "ENV" (a disabled config needs no key)
        if cfg.enabled && cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "claude" | "anthropic" => env::var("ANTHROPIC_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing ANTHROPIC_API_KEY env var"))?,
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.daily_limit == 0 {
            cfg.daily_limit = default_daily_limit();
        }

        Ok(cfg)
    }

    /// `config/llm.json` if present, else disabled defaults. A broken file is logged
    /// and treated as disabled so a run can still proceed offline.
    pub fn load_default() -> Self {
        let path = Path::new("config/llm.json");
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "llm config unusable; LLM disabled");
                Self::default()
            }
        }
    }

    /// `AI_TEST_MODE=mock` forces the deterministic offline collaborators.
    pub fn mock_mode() -> bool {
        env::var("AI_TEST_MODE").map(|v| v == "mock").unwrap_or(false)
    }
}
