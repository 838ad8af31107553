use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============= Source Types =============

/// Broad family a source belongs to, derived from its URL and domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Consulting,
    Institutional,
    Academic,
    GeneralMedia,
    #[default]
    Other,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::Consulting => "consulting",
            SourceCategory::Institutional => "institutional",
            SourceCategory::Academic => "academic",
            SourceCategory::GeneralMedia => "general_media",
            SourceCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality sub-scores of a source, each in `[0, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceScores {
    pub authenticity: f32,
    pub reliability: f32,
    pub relevance: f32,
    pub currency: f32,
    pub total: f32,
}

impl SourceScores {
    /// True when every field is a finite number within `[0, 10]`.
    pub fn is_valid(&self) -> bool {
        [
            self.authenticity,
            self.reliability,
            self.relevance,
            self.currency,
            self.total,
        ]
        .iter()
        .all(|v| v.is_finite() && (0.0..=10.0).contains(v))
    }
}

/// A search result that entered the pipeline, before or after evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// URL as returned by the provider
    pub url: String,
    /// Normalized identity used for dedup and caching
    pub canonical_url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    /// Full page content when the provider returned it or enrichment fetched it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub domain: String,
    /// Label of the provider that produced the hit
    pub provider: String,
    /// Query that produced the hit
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub category: SourceCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<SourceScores>,
    /// Elite tier when the source was accepted through the allow-list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_track: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub enriched: bool,
    pub discovered_at: DateTime<Utc>,
}

impl Source {
    /// Unevaluated source discovered now.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        provider: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            canonical_url: crate::search::canonical::canonicalize_url(&url),
            domain: crate::search::canonical::extract_domain(&url),
            url,
            title: title.into(),
            snippet: snippet.into(),
            content: None,
            provider: provider.into(),
            query: query.into(),
            category: SourceCategory::default(),
            scores: None,
            fast_track: None,
            reasoning: None,
            enriched: false,
            discovered_at: Utc::now(),
        }
    }

    /// Length in characters of the best content available for this source.
    pub fn content_len(&self) -> usize {
        self.content
            .as_deref()
            .map(|c| c.chars().count())
            .unwrap_or_else(|| self.snippet.chars().count())
    }

    pub fn total_score(&self) -> f32 {
        self.scores.map(|s| s.total).unwrap_or(0.0)
    }

    pub fn relevance(&self) -> f32 {
        self.scores.map(|s| s.relevance).unwrap_or(0.0)
    }

    pub fn reliability(&self) -> f32 {
        self.scores.map(|s| s.reliability).unwrap_or(0.0)
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("LLM error: {0}")]
    LLM(String),

    /// The LLM endpoint answered with a non-success HTTP status.
    #[error("LLM API error {status}: {message}")]
    LLMStatus { status: u16, message: String },

    #[error("LLM request timed out: {0}")]
    LLMTimeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl From<crate::providers::ProviderError> for AppError {
    fn from(err: crate::providers::ProviderError) -> Self {
        AppError::Provider(err.to_string())
    }
}

impl From<crate::utils::toml_config::ConfigError> for AppError {
    fn from(err: crate::utils::toml_config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
