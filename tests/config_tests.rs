//! Configuration loading tests
//!
//! Files are written to temporary directories and loaded the way the CLI
//! loads them.

use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use veritas::providers::{ContentExtractor, ProviderRegistry};
use veritas::quality::build_cache;
use veritas::research::ResearchCoordinator;
use veritas::search::ProviderKind;
use veritas::utils::clock::SystemClock;
use veritas::utils::toml_config::{ConfigError, VeritasConfig};
use veritas::AppError;

fn set_test_env() {
    // SAFETY: Tests only ever set these variables to the same values
    unsafe {
        std::env::set_var("VERITAS_IT_TAVILY_KEY", "tvly-it");
        std::env::set_var("VERITAS_IT_EXA_KEY", "exa-it");
        std::env::set_var("VERITAS_IT_FIRECRAWL_KEY", "fc-it");
    }
}

const KEYLESS: &str = r#"
[policy]
primary_provider = "duckduckgo"
general_min_sources = 5

[providers.duckduckgo]
type = "duckduckgo"

[providers.page_fetch]
type = "page_fetch"

[models.cheap]
type = "ollama"
base_url = "http://localhost:11434"
model = "qwen2.5:7b"
"#;

const KEYED: &str = r#"
[policy]
primary_provider = "tavily"

[providers.tavily]
type = "tavily"
api_key_env = "VERITAS_IT_TAVILY_KEY"

[providers.exa]
type = "exa"
api_key_env = "VERITAS_IT_EXA_KEY"

[providers.firecrawl]
type = "firecrawl"
api_key_env = "VERITAS_IT_FIRECRAWL_KEY"

[providers.page_fetch]
type = "page_fetch"

[providers.ddg]
type = "duckduckgo"
enabled = false
"#;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("veritas.toml");
    fs::write(&path, content).expect("write config");
    path
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().expect("temp dir");
    let err = VeritasConfig::load(dir.path().join("absent.toml")).expect_err("missing");
    assert!(matches!(err, ConfigError::FileNotFound(_)));

    // Commands that never call a provider fall back to defaults
    let config = VeritasConfig::load_unvalidated(dir.path().join("absent.toml")).expect("defaults");
    assert!(config.providers.is_empty());
}

#[test]
fn test_load_keyless_config() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, KEYLESS);

    let config = VeritasConfig::load(&path).expect("valid config");
    assert_eq!(config.policy.primary_provider, ProviderKind::DuckDuckGo);
    assert_eq!(config.policy.general_min_sources, 5);
    assert!(config.enabled_search_kinds().contains(&ProviderKind::DuckDuckGo));
}

#[test]
fn test_load_rejects_invalid_toml() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "[policy\nprimary_provider = ");
    assert!(matches!(
        VeritasConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_load_reports_unset_key() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        r#"
[providers.tavily]
type = "tavily"
api_key_env = "VERITAS_IT_NEVER_SET"
"#,
    );
    match VeritasConfig::load(&path) {
        Err(ConfigError::MissingEnvVar(name)) => assert_eq!(name, "VERITAS_IT_NEVER_SET"),
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_registry_from_keyed_config() {
    set_test_env();
    let config = VeritasConfig::parse(KEYED).expect("valid config");

    let registry = ProviderRegistry::from_config(&config).expect("registry");
    assert_eq!(registry.kinds(), vec![ProviderKind::Exa, ProviderKind::Tavily]);
    assert!(!registry.has(ProviderKind::DuckDuckGo));

    let chain: Vec<&str> = registry.extractors().iter().map(|e| e.name()).collect();
    assert_eq!(chain, vec!["firecrawl", "page_fetch"]);
}

#[test]
fn test_file_cache_from_config() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = VeritasConfig::default();
    config.cache.path = Some(dir.path().join("cache").join("evaluations.json"));

    let cache = build_cache(&config.cache, Arc::new(SystemClock));
    assert!(cache.is_enabled());
    assert_eq!(cache.stats().entry_count, 0);

    config.cache.enabled = false;
    let disabled = build_cache(&config.cache, Arc::new(SystemClock));
    assert!(!disabled.is_enabled());
}

#[cfg(feature = "ollama")]
#[tokio::test]
async fn test_coordinator_from_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, KEYLESS);
    let config = VeritasConfig::load(&path).expect("valid config");

    let coordinator = ResearchCoordinator::from_config(&config).await;
    assert!(coordinator.is_ok());

    let without_model = VeritasConfig {
        models: Default::default(),
        ..config
    };
    match ResearchCoordinator::from_config(&without_model).await {
        Err(AppError::Config(message)) => assert!(message.contains("cheap")),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("a cheap model is required"),
    }
}
