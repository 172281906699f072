//! LLM adapter: provider abstraction + file cache + daily call budget.
//!
//! Both collaborators (annotation, idea generation) talk to the model through
//! `DynLlm`, so caching and budgeting apply to every call the pipeline makes.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::llm::LlmConfig;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm disabled")]
    Disabled,
    #[error("daily llm budget of {0} calls exhausted")]
    BudgetExhausted(u32),
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm returned HTTP {0}")]
    Status(u16),
    #[error("llm returned no text")]
    Empty,
}

impl LlmError {
    /// Worth retrying after a backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Object-safe completion client used by the collaborators.
pub trait LlmClient: Send + Sync {
    fn complete<'a>(&'a self, system: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>>;
    fn provider_name(&self) -> &'static str;

    /// Forget a reply the caller could not use, so the next call for the same
    /// prompt goes back to the model.
    fn invalidate(&self, _system: &str, _prompt: &str) {}
}

pub type DynLlm = Arc<dyn LlmClient>;

/// Low-level provider: does the real remote call. Separated so the same budget and
/// cache wrapper serves production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, system: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>>;
    fn name(&self) -> &'static str;
}

/// Anthropic Messages API provider.
pub struct ClaudeProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("trend-scout/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key,
            model,
            max_tokens: 1000,
        }
    }
}

impl Provider for ClaudeProvider {
    fn fetch<'a>(&'a self, system: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(LlmError::Disabled);
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                max_tokens: u32,
                system: &'a str,
                messages: Vec<Msg<'a>>,
            }
            #[derive(Deserialize)]
            struct Resp {
                content: Vec<Block>,
            }
            #[derive(Deserialize)]
            struct Block {
                #[serde(default)]
                text: String,
            }

            let req = Req {
                model: &self.model,
                max_tokens: self.max_tokens,
                system,
                messages: vec![Msg {
                    role: "user",
                    content: prompt,
                }],
            };

            let resp = self
                .http
                .post("https://api.anthropic.com/v1/messages")
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&req)
                .send()
                .await
                .map_err(|e| LlmError::Transport(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(LlmError::Status(resp.status().as_u16()));
            }
            let body: Resp = resp
                .json()
                .await
                .map_err(|e| LlmError::Transport(e.to_string()))?;
            let text: String = body.content.into_iter().map(|b| b.text).collect();
            if text.trim().is_empty() {
                Err(LlmError::Empty)
            } else {
                Ok(text)
            }
        })
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}

/// Returns one fixed reply. Tests and local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl Provider for MockProvider {
    fn fetch<'a>(&'a self, _system: &'a str, _prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Factory: `None` when the model is disabled or has no key, so callers fall back to
/// the offline collaborators.
pub fn build_llm(cfg: &LlmConfig) -> Option<DynLlm> {
    if !cfg.enabled || cfg.api_key.is_empty() {
        return None;
    }
    match cfg.provider.as_str() {
        "claude" | "anthropic" => {
            let provider = ClaudeProvider::new(cfg.api_key.clone(), cfg.model.clone());
            Some(Arc::new(BudgetedClient::new(
                provider,
                cfg.cache_dir.clone(),
                cfg.daily_limit,
            )))
        }
        other => {
            tracing::warn!(provider = other, "unsupported llm provider; using offline collaborators");
            None
        }
    }
}

// ------------------------------------------------------------
// Budgeted client wrapper (file cache + daily limit)
// ------------------------------------------------------------

/// Counter state is guarded by a `Mutex`; it is never held across an await.
pub struct BudgetedClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit: u32,
    counter: Mutex<DailyCounter>,
}

impl<P: Provider> BudgetedClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir);
        let counter = Mutex::new(load_daily_counter(&cache_dir).unwrap_or_default());
        Self {
            inner,
            cache_dir,
            daily_limit,
            counter,
        }
    }

    /// Real calls made today.
    pub fn calls_today(&self) -> u32 {
        self.counter.lock().map(|g| g.count).unwrap_or(0)
    }

    async fn complete_impl(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        // 1) Cache lookup; hits do not count against the budget.
        let key = cache_key(system, prompt);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return Ok(hit.text);
        }

        // 2) Budget check.
        {
            let mut g = self.counter.lock().map_err(|_| LlmError::Disabled)?;
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit {
                return Err(LlmError::BudgetExhausted(self.daily_limit));
            }
            // Reserve the slot before the call so concurrent callers respect the limit.
            g.count = g.count.saturating_add(1);
            let _ = save_daily_counter(&self.cache_dir, &g);
        }

        // 3) Real call.
        let text = self.inner.fetch(system, prompt).await?;
        let _ = write_cache_file(&self.cache_dir, &key, &CachedReply { text: text.clone() });
        Ok(text)
    }
}

impl<P: Provider> LlmClient for BudgetedClient<P> {
    fn complete<'a>(&'a self, system: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(self.complete_impl(system, prompt))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }

    fn invalidate(&self, system: &str, prompt: &str) {
        let key = cache_key(system, prompt);
        match fs::remove_file(cache_path(&self.cache_dir, &key)) {
            Ok(()) => tracing::debug!(provider = self.inner.name(), "llm cache entry dropped"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, "llm cache entry could not be removed"),
        }
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedReply {
    text: String,
}

fn cache_key(system: &str, prompt: &str) -> String {
    let mut h = Sha256::new();
    h.update(system.as_bytes());
    h.update([0u8]);
    h.update(prompt.as_bytes());
    h.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<CachedReply> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&s).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &CachedReply) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}
