//! TOML-based configuration for Veritas
//!
//! This module provides declarative configuration for search providers,
//! evaluation models, policy thresholds and the evaluation cache via a TOML
//! file (`veritas.toml`). API keys are never stored in the file: entries
//! name the environment variable that holds them.
//!
//! Commands that call a provider use [`VeritasConfig::load`], which
//! validates the file and resolves every referenced environment variable.
//! Offline commands use [`VeritasConfig::load_unvalidated`].

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::Provider;
use crate::providers::exa::DEFAULT_EXA_URL;
use crate::providers::firecrawl::DEFAULT_FIRECRAWL_URL;
use crate::providers::tavily::DEFAULT_TAVILY_URL;
use crate::quality::cache::CacheConfig;
use crate::quality::metrics::QualityGateConfig;
use crate::quality::EvaluatorConfig;
use crate::references::ReferenceStyle;
use crate::retry::RetryConfig;
use crate::search::orchestrator::SearchConfig;
use crate::search::policy::{PolicyConfig, ProviderKind};

/// Root configuration structure loaded from veritas.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VeritasConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Named search providers and content extractors
    #[serde(default)]
    pub providers: HashMap<String, SearchProviderConfig>,

    /// Evaluation models
    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub quality_gate: QualityGateConfig,

    #[serde(default)]
    pub references: ReferencesConfig,
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchProviderConfig {
    Tavily {
        /// Environment variable containing API key
        #[serde(default = "default_tavily_key_env")]
        api_key_env: String,
        #[serde(default = "default_tavily_url")]
        base_url: String,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    Exa {
        #[serde(default = "default_exa_key_env")]
        api_key_env: String,
        #[serde(default = "default_exa_url")]
        base_url: String,
        /// Page text returned per hit, in characters
        #[serde(default = "default_exa_max_characters")]
        max_characters: usize,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    #[serde(rename = "duckduckgo")]
    DuckDuckGo {
        #[serde(default = "default_true")]
        enabled: bool,
    },
    Firecrawl {
        #[serde(default = "default_firecrawl_key_env")]
        api_key_env: String,
        #[serde(default = "default_firecrawl_url")]
        base_url: String,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    PageFetch {
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

fn default_true() -> bool {
    true
}

fn default_tavily_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_tavily_url() -> String {
    DEFAULT_TAVILY_URL.to_string()
}

fn default_exa_key_env() -> String {
    "EXA_API_KEY".to_string()
}

fn default_exa_url() -> String {
    DEFAULT_EXA_URL.to_string()
}

fn default_exa_max_characters() -> usize {
    8000
}

fn default_firecrawl_key_env() -> String {
    "FIRECRAWL_API_KEY".to_string()
}

fn default_firecrawl_url() -> String {
    DEFAULT_FIRECRAWL_URL.to_string()
}

impl SearchProviderConfig {
    pub fn enabled(&self) -> bool {
        match self {
            SearchProviderConfig::Tavily { enabled, .. }
            | SearchProviderConfig::Exa { enabled, .. }
            | SearchProviderConfig::DuckDuckGo { enabled }
            | SearchProviderConfig::Firecrawl { enabled, .. }
            | SearchProviderConfig::PageFetch { enabled } => *enabled,
        }
    }

    /// Environment variable holding the API key, for keyed providers
    pub fn api_key_env(&self) -> Option<&str> {
        match self {
            SearchProviderConfig::Tavily { api_key_env, .. }
            | SearchProviderConfig::Exa { api_key_env, .. }
            | SearchProviderConfig::Firecrawl { api_key_env, .. } => Some(api_key_env),
            SearchProviderConfig::DuckDuckGo { .. } | SearchProviderConfig::PageFetch { .. } => {
                None
            }
        }
    }

    /// Search provider kind, `None` for content extractors
    pub fn search_kind(&self) -> Option<ProviderKind> {
        match self {
            SearchProviderConfig::Tavily { .. } => Some(ProviderKind::Tavily),
            SearchProviderConfig::Exa { .. } => Some(ProviderKind::Exa),
            SearchProviderConfig::DuckDuckGo { .. } => Some(ProviderKind::DuckDuckGo),
            SearchProviderConfig::Firecrawl { .. } | SearchProviderConfig::PageFetch { .. } => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SearchProviderConfig::Tavily { .. } => "tavily",
            SearchProviderConfig::Exa { .. } => "exa",
            SearchProviderConfig::DuckDuckGo { .. } => "duckduckgo",
            SearchProviderConfig::Firecrawl { .. } => "firecrawl",
            SearchProviderConfig::PageFetch { .. } => "page_fetch",
        }
    }
}

// ============= Model Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        model: String,
    },
    OpenAI {
        /// Environment variable containing API key
        #[serde(default = "default_openai_key_env")]
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        model: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

impl ModelConfig {
    pub fn model(&self) -> &str {
        match self {
            ModelConfig::Ollama { model, .. } | ModelConfig::OpenAI { model, .. } => model,
        }
    }

    /// Resolve into a runtime [`Provider`], reading the API key from the
    /// environment.
    pub fn to_provider(&self) -> Result<Provider, ConfigError> {
        match self {
            ModelConfig::Ollama { base_url, model } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
                model: model.clone(),
            }),
            ModelConfig::OpenAI {
                api_key_env,
                api_base,
                model,
            } => {
                let api_key = std::env::var(api_key_env)
                    .map_err(|_| ConfigError::MissingEnvVar(api_key_env.clone()))?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: api_base.clone(),
                    model: model.clone(),
                })
            }
        }
    }
}

/// The two evaluation tiers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelsConfig {
    /// First-pass model used for every non-fast-tracked source
    #[serde(default)]
    pub cheap: Option<ModelConfig>,

    /// Escalation model for gray-zone and critical sources
    #[serde(default)]
    pub strong: Option<ModelConfig>,
}

// ============= Reference Configuration =============

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReferencesConfig {
    #[serde(default)]
    pub style: ReferenceStyle,
}

// ============= Configuration Loading & Validation =============

/// Configuration warnings that don't prevent operation but may indicate issues
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub kind: ConfigWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarningKind {
    UnusedProvider,
    MissingBooster,
    MissingStrongModel,
    GrayZoneInverted,
    WeightsNotNormalized,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Primary provider '{0}' is not configured or is disabled")]
    MissingPrimaryProvider(String),
}

fn check_score(name: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=10.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "evaluator.{} must be within 0-10, got {}",
            name, value
        )));
    }
    Ok(())
}

impl VeritasConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Read a config file without validating it, falling back to defaults
    /// when the file does not exist. For commands that never call a
    /// provider.
    pub fn load_unvalidated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: VeritasConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for internal consistency and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, provider) in &self.providers {
            if !provider.enabled() {
                continue;
            }
            if let Some(env) = provider.api_key_env() {
                self.validate_env_var(env)?;
            }
            if let SearchProviderConfig::Exa { max_characters, .. } = provider {
                if *max_characters == 0 {
                    return Err(ConfigError::ValidationError(format!(
                        "providers.{}.max_characters must be greater than 0",
                        name
                    )));
                }
            }
        }

        let primary = self.policy.primary_provider;
        if !self.enabled_search_kinds().contains(&primary) {
            return Err(ConfigError::MissingPrimaryProvider(primary.to_string()));
        }

        for model in [&self.models.cheap, &self.models.strong].into_iter().flatten() {
            if model.model().trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "model name must not be empty".to_string(),
                ));
            }
            if let ModelConfig::OpenAI { api_key_env, .. } = model {
                self.validate_env_var(api_key_env)?;
            }
        }

        if self.policy.general_min_sources == 0 || self.policy.critical_min_sources == 0 {
            return Err(ConfigError::ValidationError(
                "policy source targets must be greater than 0".to_string(),
            ));
        }
        if self.search.max_concurrent_queries == 0 {
            return Err(ConfigError::ValidationError(
                "search.max_concurrent_queries must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.cache.ttl_days < 0 {
            return Err(ConfigError::ValidationError(
                "cache.ttl_days must not be negative".to_string(),
            ));
        }

        let e = &self.evaluator;
        check_score("gray_zone_low", e.gray_zone_low)?;
        check_score("gray_zone_high", e.gray_zone_high)?;
        check_score("accept_threshold", e.accept_threshold)?;
        check_score("fast_track_accept", e.fast_track_accept)?;
        check_score("min_relevance", e.min_relevance)?;
        check_score("min_authenticity", e.min_authenticity)?;
        check_score("min_reliability", e.min_reliability)?;

        let w = &e.weights;
        if [w.authenticity, w.reliability, w.relevance, w.currency]
            .iter()
            .any(|v| *v < 0.0 || !v.is_finite())
        {
            return Err(ConfigError::ValidationError(
                "evaluator weights must be finite and non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&e.general_media_max_ratio) {
            return Err(ConfigError::ValidationError(
                "evaluator.general_media_max_ratio must be within 0-1".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate configuration with warnings for questionable settings
    ///
    /// Returns Ok with warnings, or Err if validation fails
    pub fn validate_with_warnings(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(self.check_unused_providers());

        if let Some(booster) = self.policy.booster {
            if !self.enabled_search_kinds().contains(&booster.provider) {
                warnings.push(ConfigWarning {
                    kind: ConfigWarningKind::MissingBooster,
                    message: format!(
                        "Booster provider '{}' is not configured; below-target runs will not be boosted",
                        booster.provider
                    ),
                });
            }
        }

        if self.models.strong.is_none() {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::MissingStrongModel,
                message: "No [models.strong] configured; gray-zone sources are decided by the cheap model"
                    .to_string(),
            });
        }

        if self.evaluator.gray_zone_low > self.evaluator.gray_zone_high {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::GrayZoneInverted,
                message: format!(
                    "evaluator.gray_zone_low ({}) is above gray_zone_high ({}); no source will escalate on score",
                    self.evaluator.gray_zone_low, self.evaluator.gray_zone_high
                ),
            });
        }

        let w = &self.evaluator.weights;
        let sum = w.authenticity + w.reliability + w.relevance + w.currency;
        if (sum - 1.0).abs() > 0.01 {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::WeightsNotNormalized,
                message: format!(
                    "evaluator weights sum to {:.2}; totals will not stay on the 0-10 scale",
                    sum
                ),
            });
        }

        Ok(warnings)
    }

    /// Providers that no playbook, booster or enrichment pass will call
    fn check_unused_providers(&self) -> Vec<ConfigWarning> {
        let mut used: HashSet<ProviderKind> = HashSet::new();
        used.insert(self.policy.primary_provider);
        // Deep technical playbooks always search Exa
        used.insert(ProviderKind::Exa);
        if let Some(booster) = self.policy.booster {
            used.insert(booster.provider);
        }

        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| {
                let provider = self.providers.get(name)?;
                if !provider.enabled() {
                    return None;
                }
                let unused = match provider.search_kind() {
                    Some(kind) => !used.contains(&kind),
                    None => !self.search.enrichment_enabled,
                };
                unused.then(|| ConfigWarning {
                    kind: ConfigWarningKind::UnusedProvider,
                    message: format!(
                        "Provider '{}' ({}) is configured but never called",
                        name,
                        provider.type_name()
                    ),
                })
            })
            .collect()
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Get a resolved value from an env var reference
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name).ok()
    }

    /// Get provider by name
    pub fn get_provider(&self, name: &str) -> Option<&SearchProviderConfig> {
        self.providers.get(name)
    }

    /// Search provider kinds with an enabled entry
    pub fn enabled_search_kinds(&self) -> HashSet<ProviderKind> {
        self.providers
            .values()
            .filter(|p| p.enabled())
            .filter_map(|p| p.search_kind())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::policy::SearchDepth;

    fn create_test_config() -> String {
        r#"
[logging]
level = "debug"

[search]
max_concurrent_queries = 3
excluded_domains = ["pinterest.com"]

[policy]
general_min_sources = 6
depth_override = "advanced"

[evaluator]
gray_zone_low = 5.0
gray_zone_high = 7.0

[evaluator.weights]
authenticity = 0.3
reliability = 0.3
relevance = 0.3
currency = 0.1

[cache]
ttl_days = 3

[providers.tavily]
type = "tavily"
api_key_env = "VERITAS_UNIT_TAVILY_KEY"

[providers.exa]
type = "exa"
api_key_env = "VERITAS_UNIT_EXA_KEY"
max_characters = 12000

[providers.ddg]
type = "duckduckgo"
enabled = false

[providers.fetch]
type = "page_fetch"

[models.cheap]
type = "ollama"
model = "qwen2.5:7b"

[models.strong]
type = "openai"
api_key_env = "VERITAS_UNIT_OPENAI_KEY"
model = "gpt-4o"
"#
        .to_string()
    }

    fn set_test_env() {
        // SAFETY: Tests only ever set these variables to the same values
        unsafe {
            std::env::set_var("VERITAS_UNIT_TAVILY_KEY", "tvly-test");
            std::env::set_var("VERITAS_UNIT_EXA_KEY", "exa-test");
            std::env::set_var("VERITAS_UNIT_OPENAI_KEY", "sk-test");
        }
    }

    #[test]
    fn test_parse_config() {
        set_test_env();

        let config = VeritasConfig::parse(&create_test_config()).expect("Failed to parse config");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.search.max_concurrent_queries, 3);
        assert_eq!(config.policy.general_min_sources, 6);
        assert_eq!(config.policy.depth_override, Some(SearchDepth::Advanced));
        assert_eq!(config.cache.ttl_days, 3);
        assert_eq!(config.evaluator.gray_zone_low, 5.0);
        assert_eq!(config.providers.len(), 4);
        assert!(matches!(
            config.get_provider("exa"),
            Some(SearchProviderConfig::Exa { max_characters: 12000, .. })
        ));
        assert!(!config.get_provider("ddg").map(|p| p.enabled()).unwrap_or(true));
        assert_eq!(config.models.cheap.as_ref().map(|m| m.model()), Some("qwen2.5:7b"));
    }

    #[test]
    fn test_defaults() {
        let config: VeritasConfig = toml::from_str("").expect("empty config parses");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.policy.general_min_sources, 7);
        assert_eq!(config.policy.critical_min_sources, 10);
        assert_eq!(config.evaluator.fast_track_accept, 6.5);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.cache.enabled);
        assert_eq!(config.references.style, ReferenceStyle::Ieee);
        assert!(config.models.cheap.is_none());
    }

    #[test]
    fn test_provider_defaults() {
        let config: VeritasConfig = toml::from_str(
            r#"
[providers.tavily]
type = "tavily"

[providers.firecrawl]
type = "firecrawl"
"#,
        )
        .expect("parses");

        match config.get_provider("tavily") {
            Some(SearchProviderConfig::Tavily {
                api_key_env,
                base_url,
                enabled,
            }) => {
                assert_eq!(api_key_env, "TAVILY_API_KEY");
                assert_eq!(base_url, DEFAULT_TAVILY_URL);
                assert!(*enabled);
            }
            other => panic!("unexpected provider config: {:?}", other),
        }
        assert_eq!(
            config.get_provider("firecrawl").and_then(|p| p.api_key_env()),
            Some("FIRECRAWL_API_KEY")
        );
        assert_eq!(config.get_provider("firecrawl").and_then(|p| p.search_kind()), None);
    }

    #[test]
    fn test_validation_missing_env_var() {
        let content = r#"
[providers.tavily]
type = "tavily"
api_key_env = "VERITAS_UNIT_DEFINITELY_UNSET"
"#;
        let result = VeritasConfig::parse(content);
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvVar(ref name)) if name == "VERITAS_UNIT_DEFINITELY_UNSET"
        ));
    }

    #[test]
    fn test_validation_missing_primary_provider() {
        let content = r#"
[providers.ddg]
type = "duckduckgo"
"#;
        let result = VeritasConfig::parse(content);
        assert!(matches!(result, Err(ConfigError::MissingPrimaryProvider(ref p)) if p == "tavily"));

        let content = r#"
[policy]
primary_provider = "duckduckgo"

[providers.ddg]
type = "duckduckgo"
"#;
        assert!(VeritasConfig::parse(content).is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_thresholds() {
        let content = r#"
[policy]
primary_provider = "duckduckgo"

[evaluator]
accept_threshold = 12.0

[providers.ddg]
type = "duckduckgo"
"#;
        assert!(matches!(
            VeritasConfig::parse(content),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_warnings() {
        let content = r#"
[policy]
primary_provider = "duckduckgo"

[search]
enrichment_enabled = false

[evaluator]
gray_zone_low = 8.0
gray_zone_high = 6.0

[evaluator.weights]
authenticity = 0.5
reliability = 0.5
relevance = 0.5
currency = 0.5

[providers.ddg]
type = "duckduckgo"

[providers.fetch]
type = "page_fetch"
"#;
        let config: VeritasConfig = toml::from_str(content).expect("parses");
        let warnings = config.validate_with_warnings().expect("valid");
        let kinds: Vec<ConfigWarningKind> = warnings.iter().map(|w| w.kind.clone()).collect();

        assert!(kinds.contains(&ConfigWarningKind::UnusedProvider));
        assert!(kinds.contains(&ConfigWarningKind::MissingBooster));
        assert!(kinds.contains(&ConfigWarningKind::MissingStrongModel));
        assert!(kinds.contains(&ConfigWarningKind::GrayZoneInverted));
        assert!(kinds.contains(&ConfigWarningKind::WeightsNotNormalized));
    }

    #[test]
    fn test_openai_model_resolves_key() {
        set_test_env();
        let model = ModelConfig::OpenAI {
            api_key_env: "VERITAS_UNIT_OPENAI_KEY".to_string(),
            api_base: default_openai_base(),
            model: "gpt-4o".to_string(),
        };
        match model.to_provider() {
            Ok(Provider::OpenAI { api_key, .. }) => assert_eq!(api_key, "sk-test"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
