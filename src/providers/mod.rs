//! Search and content-extraction providers
//!
//! - [`tavily`] - Tavily web research API
//! - [`exa`] - Exa neural search API (the default booster)
//! - [`firecrawl`] - Firecrawl page scraping (enrichment)
//! - [`duckduckgo`] - keyless search and page fetching via `daedra`
//!
//! Every backend sits behind [`SearchProvider`] or [`ContentExtractor`], so
//! the orchestrator and its tests never depend on a concrete API.
//! [`CircuitBreakers`] track rate limits and exhausted credits per provider
//! for the lifetime of the process.

pub mod duckduckgo;
pub mod exa;
pub mod firecrawl;
pub mod tavily;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::retry::RetryableError;
use crate::search::policy::{ProviderKind, SearchDepth};
use crate::types::{AppError, Result};
use crate::utils::toml_config::{SearchProviderConfig, VeritasConfig};

pub use duckduckgo::{DuckDuckGoProvider, PageFetchExtractor};
pub use exa::ExaClient;
pub use firecrawl::FirecrawlClient;
pub use tavily::TavilyClient;

// ============= Types =============

/// One raw result from a search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
}

/// Errors from a search provider call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("credits exhausted: {0}")]
    CreditsExhausted(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("provider disabled: {0}")]
    Disabled(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::RateLimited(_)
            | ProviderError::Transport(_) => true,
            ProviderError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map an unsuccessful HTTP status to an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message: String = body.chars().take(300).collect();
        match status {
            429 => ProviderError::RateLimited(message),
            402 => ProviderError::CreditsExhausted(message),
            401 | 403 => ProviderError::Auth(message),
            _ => ProviderError::Http { status, message },
        }
    }

    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }

    fn breaker_signal(&self) -> BreakerSignal {
        match self {
            ProviderError::RateLimited(_) => BreakerSignal::RateLimited,
            ProviderError::CreditsExhausted(_) | ProviderError::Auth(_) => BreakerSignal::Fatal,
            _ => BreakerSignal::None,
        }
    }
}

impl RetryableError for ProviderError {
    fn is_retryable(&self) -> bool {
        ProviderError::is_retryable(self)
    }

    fn timed_out(after: Duration) -> Self {
        ProviderError::Timeout(after)
    }
}

/// Outcome kind of a content extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Success,
    RateLimited,
    CreditsExhausted,
    Timeout,
    HttpError,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("extraction failed ({status:?}): {message}")]
pub struct ExtractionError {
    pub status: ExtractionStatus,
    pub message: String,
}

impl ExtractionError {
    pub fn new(status: ExtractionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn breaker_signal(&self) -> BreakerSignal {
        match self.status {
            ExtractionStatus::RateLimited => BreakerSignal::RateLimited,
            ExtractionStatus::CreditsExhausted => BreakerSignal::Fatal,
            _ => BreakerSignal::None,
        }
    }
}

impl From<ProviderError> for ExtractionError {
    fn from(err: ProviderError) -> Self {
        let status = match &err {
            ProviderError::RateLimited(_) => ExtractionStatus::RateLimited,
            ProviderError::CreditsExhausted(_) => ExtractionStatus::CreditsExhausted,
            ProviderError::Timeout(_) => ExtractionStatus::Timeout,
            _ => ExtractionStatus::HttpError,
        };
        ExtractionError::new(status, err.to_string())
    }
}

impl RetryableError for ExtractionError {
    fn is_retryable(&self) -> bool {
        matches!(
            self.status,
            ExtractionStatus::RateLimited | ExtractionStatus::Timeout
        )
    }

    fn timed_out(after: Duration) -> Self {
        ExtractionError::new(
            ExtractionStatus::Timeout,
            format!("timed out after {:?}", after),
        )
    }
}

// ============= Traits =============

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Label used in logs, metrics and the breaker table
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    async fn search(
        &self,
        query: &str,
        depth: SearchDepth,
        max_results: usize,
    ) -> std::result::Result<Vec<SearchHit>, ProviderError>;
}

/// Fetches the full text (markdown) of a page.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, url: &str) -> std::result::Result<String, ExtractionError>;
}

// ============= Circuit Breakers =============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerSignal {
    None,
    RateLimited,
    Fatal,
}

#[derive(Debug, Default)]
struct Breaker {
    open: AtomicBool,
    consecutive_rate_limits: AtomicU32,
}

/// Per-provider breakers. A provider is disabled after `threshold`
/// consecutive rate-limit failures, or at once when its credits run out or
/// its key is rejected. Once open a breaker stays open.
#[derive(Debug)]
pub struct CircuitBreakers {
    threshold: u32,
    breakers: RwLock<HashMap<String, Arc<Breaker>>>,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self::new(3)
    }
}

impl CircuitBreakers {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    fn breaker(&self, name: &str) -> Arc<Breaker> {
        if let Some(b) = self.breakers.read().get(name) {
            return Arc::clone(b);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(name.to_string()).or_default())
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.breakers
            .read()
            .get(name)
            .map(|b| b.open.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn trip(&self, name: &str, reason: &str) {
        let breaker = self.breaker(name);
        if !breaker.open.swap(true, Ordering::AcqRel) {
            warn!("Disabling provider '{}' for the rest of this run: {}", name, reason);
        }
    }

    pub fn record_success(&self, name: &str) {
        self.breaker(name)
            .consecutive_rate_limits
            .store(0, Ordering::Release);
    }

    pub fn record_provider_failure(&self, name: &str, err: &ProviderError) {
        self.record(name, err.breaker_signal(), &err.to_string());
    }

    pub fn record_extraction_failure(&self, name: &str, err: &ExtractionError) {
        self.record(name, err.breaker_signal(), &err.message);
    }

    fn record(&self, name: &str, signal: BreakerSignal, reason: &str) {
        match signal {
            BreakerSignal::None => {}
            BreakerSignal::Fatal => self.trip(name, reason),
            BreakerSignal::RateLimited => {
                let count = self
                    .breaker(name)
                    .consecutive_rate_limits
                    .fetch_add(1, Ordering::AcqRel)
                    + 1;
                if count >= self.threshold {
                    self.trip(name, &format!("{} consecutive rate limits", count));
                }
            }
        }
    }

    /// Names of providers whose breaker is open
    pub fn open_breakers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .read()
            .iter()
            .filter(|(_, b)| b.open.load(Ordering::Acquire))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

// ============= Registry =============

/// Configured search providers and the ordered extractor chain.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    search: HashMap<ProviderKind, Arc<dyn SearchProvider>>,
    extractors: Vec<Arc<dyn ContentExtractor>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider declared under `[providers]`. API keys are read
    /// from the environment variables the entries name.
    pub fn from_config(config: &VeritasConfig) -> Result<Self> {
        let mut registry = Self::new();
        let mut extractors: Vec<(u8, Arc<dyn ContentExtractor>)> = Vec::new();

        let mut names: Vec<&String> = config.providers.keys().collect();
        names.sort();

        for name in names {
            let Some(provider) = config.providers.get(name) else {
                continue;
            };
            if !provider.enabled() {
                info!("Provider '{}' is disabled in configuration", name);
                continue;
            }
            match provider {
                SearchProviderConfig::Tavily {
                    api_key_env,
                    base_url,
                    ..
                } => {
                    let key = resolve_key(name, api_key_env)?;
                    registry.register(Arc::new(TavilyClient::new(key, base_url.clone())));
                }
                SearchProviderConfig::Exa {
                    api_key_env,
                    base_url,
                    max_characters,
                    ..
                } => {
                    let key = resolve_key(name, api_key_env)?;
                    registry.register(Arc::new(
                        ExaClient::new(key, base_url.clone()).with_max_characters(*max_characters),
                    ));
                }
                SearchProviderConfig::DuckDuckGo { .. } => {
                    registry.register(Arc::new(DuckDuckGoProvider::new()));
                }
                SearchProviderConfig::Firecrawl {
                    api_key_env,
                    base_url,
                    ..
                } => {
                    let key = resolve_key(name, api_key_env)?;
                    extractors.push((0, Arc::new(FirecrawlClient::new(key, base_url.clone()))));
                }
                SearchProviderConfig::PageFetch { .. } => {
                    extractors.push((1, Arc::new(PageFetchExtractor::new())));
                }
            }
        }

        // Firecrawl first, the keyless fetcher as fallback
        extractors.sort_by_key(|(order, _)| *order);
        registry.extractors = extractors.into_iter().map(|(_, e)| e).collect();
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn SearchProvider>) {
        self.search.insert(provider.kind(), provider);
    }

    pub fn register_extractor(&mut self, extractor: Arc<dyn ContentExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn SearchProvider>> {
        self.search.get(&kind).cloned()
    }

    pub fn has(&self, kind: ProviderKind) -> bool {
        self.search.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.search.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    pub fn extractors(&self) -> &[Arc<dyn ContentExtractor>] {
        &self.extractors
    }
}

fn resolve_key(provider: &str, env_name: &str) -> Result<String> {
    std::env::var(env_name).map_err(|_| {
        AppError::Config(format!(
            "environment variable '{}' for provider '{}' is not set",
            env_name, provider
        ))
    })
}

/// Truncate to `max` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ProviderError::from_status(429, "slow down"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(ProviderError::from_status(402, ""), ProviderError::CreditsExhausted(_)));
        assert!(matches!(ProviderError::from_status(401, ""), ProviderError::Auth(_)));
        assert!(matches!(
            ProviderError::from_status(503, ""),
            ProviderError::Http { status: 503, .. }
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::RateLimited(String::new()).is_retryable());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::Http { status: 502, message: String::new() }.is_retryable());
        assert!(!ProviderError::Http { status: 404, message: String::new() }.is_retryable());
        assert!(!ProviderError::CreditsExhausted(String::new()).is_retryable());
        assert!(!ProviderError::Auth(String::new()).is_retryable());
    }

    #[test]
    fn test_breaker_trips_after_threshold() {
        let breakers = CircuitBreakers::new(2);
        let limited = ProviderError::RateLimited("429".into());

        breakers.record_provider_failure("tavily", &limited);
        assert!(!breakers.is_open("tavily"));
        breakers.record_provider_failure("tavily", &limited);
        assert!(breakers.is_open("tavily"));
        assert!(!breakers.is_open("exa"));
        assert_eq!(breakers.open_breakers(), vec!["tavily".to_string()]);
    }

    #[test]
    fn test_breaker_success_resets_count() {
        let breakers = CircuitBreakers::new(2);
        let limited = ProviderError::RateLimited("429".into());

        breakers.record_provider_failure("exa", &limited);
        breakers.record_success("exa");
        breakers.record_provider_failure("exa", &limited);
        assert!(!breakers.is_open("exa"));
    }

    #[test]
    fn test_breaker_trips_on_credits() {
        let breakers = CircuitBreakers::default();
        breakers.record_extraction_failure(
            "firecrawl",
            &ExtractionError::new(ExtractionStatus::CreditsExhausted, "402"),
        );
        assert!(breakers.is_open("firecrawl"));

        breakers.record_provider_failure("exa", &ProviderError::Transport("reset".into()));
        assert!(!breakers.is_open("exa"));
    }

    #[test]
    fn test_extraction_error_from_provider() {
        let err = ExtractionError::from(ProviderError::RateLimited("x".into()));
        assert_eq!(err.status, ExtractionStatus::RateLimited);
        assert!(err.is_retryable());

        let err = ExtractionError::from(ProviderError::Http {
            status: 404,
            message: "gone".into(),
        });
        assert_eq!(err.status, ExtractionStatus::HttpError);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
