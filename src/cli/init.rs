//! Init command implementation
//!
//! Writes a starter `veritas.toml`, an `.env.example` listing the API keys
//! it references, and a `.gitignore` entry for the evaluation cache.

use super::output::Output;
use std::fs;
use std::path::Path;

/// Result of the init operation
pub enum InitResult {
    /// Initialization completed successfully
    Success,
    /// Project already exists (veritas.toml found)
    AlreadyExists,
    /// An error occurred during initialization
    Error(String),
}

/// Configuration for the init command
pub struct InitConfig {
    /// Directory to initialize
    pub path: std::path::PathBuf,
    /// Overwrite existing files
    pub force: bool,
    /// Evaluation model backend (ollama or openai)
    pub model_provider: String,
    /// Primary search provider (tavily or duckduckgo)
    pub search_provider: String,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing Veritas");

    let base_path = &config.path;
    if !base_path.exists() {
        if let Err(e) = fs::create_dir_all(base_path) {
            output.error(&format!("Failed to create {}: {}", base_path.display(), e));
            return InitResult::Error(e.to_string());
        }
    }

    let config_path = base_path.join("veritas.toml");
    if config_path.exists() && !config.force {
        output.warning("veritas.toml already exists!");
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    output.subheader("Creating configuration files");

    let toml_content = generate_veritas_toml(&config);
    if let Err(e) = write_file(&config_path, &toml_content, config.force) {
        output.error(&format!("Failed to create veritas.toml: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("config", "veritas.toml");

    let env_example_path = base_path.join(".env.example");
    if let Err(e) = write_file(&env_example_path, &generate_env_example(&config), config.force) {
        output.error(&format!("Failed to create .env.example: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("env", ".env.example");

    let gitignore_path = base_path.join(".gitignore");
    if gitignore_path.exists() {
        output.skipped(".gitignore", "already exists");
    } else if let Err(e) = write_file(&gitignore_path, &generate_gitignore(), false) {
        output.warning(&format!("Failed to create .gitignore: {}", e));
    } else {
        output.created("file", ".gitignore");
    }

    output.complete("Veritas initialized");

    output.header("Next Steps");
    output.newline();
    output.info("1. Set up API keys:");
    output.command("cp .env.example .env");
    output.newline();

    if config.model_provider != "openai" {
        output.info("2. Start Ollama and pull the evaluation models:");
        output.command("ollama serve");
        output.command("ollama pull qwen2.5:7b");
        output.newline();
    }

    output.info("3. Run a search:");
    output.command("veritas search \"grid-scale battery storage\" -r market");

    InitResult::Success
}

fn write_file(path: &Path, content: &str, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Ok(()); // Skip existing files unless force is true
    }
    fs::write(path, content)
}

fn generate_veritas_toml(config: &InitConfig) -> String {
    let models_section = if config.model_provider == "openai" {
        r#"# Evaluation models (set OPENAI_API_KEY in .env)
[models.cheap]
type = "openai"
api_key_env = "OPENAI_API_KEY"
model = "gpt-4o-mini"

[models.strong]
type = "openai"
api_key_env = "OPENAI_API_KEY"
model = "gpt-4o"
"#
    } else {
        r#"# Evaluation models (local Ollama, no API key required)
[models.cheap]
type = "ollama"
base_url = "http://localhost:11434"
model = "qwen2.5:7b"

[models.strong]
type = "ollama"
base_url = "http://localhost:11434"
model = "qwen2.5:32b"
"#
    };

    let (primary, primary_section) = if config.search_provider == "duckduckgo" {
        (
            "duckduckgo",
            r#"# Keyless web search
[providers.duckduckgo]
type = "duckduckgo"
"#,
        )
    } else {
        (
            "tavily",
            r#"# General web search (set TAVILY_API_KEY in .env)
[providers.tavily]
type = "tavily"
api_key_env = "TAVILY_API_KEY"
"#,
        )
    };

    format!(
        r#"# Veritas configuration

[logging]
level = "info"
json = false

[search]
max_concurrent_queries = 4
dispatch_delay_ms = 250
breaker_threshold = 3
enrichment_enabled = true
excluded_domains = ["pinterest.com", "quora.com"]

[policy]
primary_provider = "{primary}"
general_min_sources = 7
critical_min_sources = 10

[policy.booster]
provider = "exa"
results = 15

[evaluator]
gray_zone_low = 5.5
gray_zone_high = 7.5
accept_threshold = 7.0
min_relevance = 8.0
fast_track_accept = 6.5

[retry]
max_attempts = 3
initial_backoff_ms = 2000
max_backoff_ms = 8000

[cache]
enabled = true
ttl_days = 7
path = ".veritas/evaluations.json"

[references]
style = "ieee"

{primary_section}
# Semantic search, used by deep technical playbooks and the booster
# (set EXA_API_KEY in .env)
[providers.exa]
type = "exa"
api_key_env = "EXA_API_KEY"

# Full-page extraction for enrichment (set FIRECRAWL_API_KEY in .env)
[providers.firecrawl]
type = "firecrawl"
api_key_env = "FIRECRAWL_API_KEY"

# Keyless fallback extractor
[providers.page_fetch]
type = "page_fetch"

{models_section}"#
    )
}

fn generate_env_example(config: &InitConfig) -> String {
    let mut content = String::from("# Veritas API keys\n");
    if config.search_provider != "duckduckgo" {
        content.push_str("TAVILY_API_KEY=\n");
    }
    content.push_str("EXA_API_KEY=\nFIRECRAWL_API_KEY=\n");
    if config.model_provider == "openai" {
        content.push_str("OPENAI_API_KEY=\n");
    }
    content.push_str("\n# Log filter, overrides [logging].level\nRUST_LOG=veritas=info\n");
    content
}

fn generate_gitignore() -> String {
    "# Veritas\n.env\n.veritas/\n".to_string()
}
