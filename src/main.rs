use anyhow::{bail, Context};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use veritas::cli::init::{self, InitConfig, InitResult};
use veritas::cli::output::Output;
use veritas::cli::{CacheCommands, Cli, Commands};
use veritas::quality::build_cache;
use veritas::references::{validate_references, ChapterInput, ReferenceStyle};
use veritas::research::ResearchCoordinator;
use veritas::search::SearchRequest;
use veritas::utils::clock::SystemClock;
use veritas::utils::toml_config::{LoggingConfig, VeritasConfig};

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so JSON results on stdout stay clean
    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: &Path, output: &Output) -> anyhow::Result<VeritasConfig> {
    let config = VeritasConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    for warning in config.validate_with_warnings()? {
        output.warning(&warning.message);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        Commands::Init {
            path,
            force,
            model_provider,
            search_provider,
        } => {
            let result = init::run(
                InitConfig {
                    path,
                    force,
                    model_provider,
                    search_provider,
                },
                &output,
            );
            match result {
                InitResult::Success | InitResult::AlreadyExists => Ok(()),
                InitResult::Error(e) => bail!(e),
            }
        }

        Commands::Search {
            topic,
            report_type,
            queries,
            json,
            output: output_path,
        } => {
            let config = load_config(&cli.config, &output)?;
            init_tracing(&config.logging, cli.verbose);

            let coordinator = ResearchCoordinator::from_config(&config).await?;
            let request = SearchRequest::new(topic, report_type).with_queries(queries);
            let outcome = coordinator.gather(&request).await?;

            let serialized = serde_json::to_string_pretty(&outcome)?;
            if let Some(path) = output_path {
                std::fs::write(&path, &serialized)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }

            if json {
                println!("{}", serialized);
                return Ok(());
            }

            output.header(&format!("Sources for \"{}\"", outcome.topic));
            output.kv("playbook", &outcome.playbook.name);
            output.kv(
                "accepted",
                &format!(
                    "{} of {} target ({} rejected)",
                    outcome.accepted.len(),
                    outcome.playbook.minimum_source_target,
                    outcome.rejected_count
                ),
            );
            output.kv(
                "confidence",
                &format!(
                    "{:.0}/100 ({})",
                    outcome.quality_gate.confidence.score,
                    outcome.quality_gate.confidence.level.as_str()
                ),
            );
            output.kv("latency", &format!("{} ms", outcome.metrics.latency_ms));
            output.newline();
            for (i, source) in outcome.accepted.iter().enumerate() {
                output.source_row(i + 1, source);
            }
            for outage in &outcome.metrics.outages {
                output.warning(&format!("provider unavailable: {}", outage));
            }
            for issue in &outcome.quality_gate.issues {
                output.warning(&issue.message);
            }
            output.recommendation(outcome.recommendation);
            Ok(())
        }

        Commands::Consolidate {
            chapters,
            output: output_path,
            style,
        } => {
            let config = VeritasConfig::load_unvalidated(&cli.config)?;
            init_tracing(&config.logging, cli.verbose);

            let style = match style {
                Some(s) => s.parse::<ReferenceStyle>()?,
                None => config.references.style,
            };

            let mut inputs = Vec::with_capacity(chapters.len());
            for path in &chapters {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let topic = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                inputs.push(ChapterInput::from_markdown(topic, &text));
            }

            let consolidator = veritas::references::ReferenceConsolidator::new(style);
            let (markdown, document) = consolidator.consolidate_to_markdown(&inputs);

            match output_path {
                Some(path) => {
                    std::fs::write(&path, &markdown)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    output.success(&format!(
                        "{} chapters, {} references written to {}",
                        document.chapters.len(),
                        document.references.len(),
                        path.display()
                    ));
                }
                None => println!("{}", markdown),
            }

            let report = &document.report;
            if report.duplicates_merged > 0 {
                output.info(&format!("{} duplicate references merged", report.duplicates_merged));
            }
            for dropped in &report.dropped {
                output.warning(&format!(
                    "dropped [{}] from \"{}\": unusable URL {}",
                    dropped.local_number, dropped.chapter, dropped.url
                ));
            }
            for (topic, numbers) in document.unresolved() {
                output.warning(&format!("unresolved citations in \"{}\": {:?}", topic, numbers));
            }
            Ok(())
        }

        Commands::ValidateRefs { file, json } => {
            let config = VeritasConfig::load_unvalidated(&cli.config)?;
            init_tracing(&config.logging, cli.verbose);

            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let report = validate_references(&text);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output.header(&format!("References in {}", file.display()));
                output.kv("entries", &report.total.to_string());
                output.kv("valid", &report.valid.to_string());
                if report.missing_section {
                    output.warning("no reference section found");
                }
                if !report.untitled.is_empty() {
                    output.warning(&format!("untitled: {:?}", report.untitled));
                }
                for dup in &report.duplicates {
                    output.warning(&format!(
                        "duplicate {:?} at [{}]: {}",
                        dup.kind, dup.number, dup.url
                    ));
                }
                if !report.orphans.is_empty() {
                    output.warning(&format!("listed but never cited: {:?}", report.orphans));
                }
                if !report.phantoms.is_empty() {
                    output.warning(&format!("cited but never listed: {:?}", report.phantoms));
                }
                if report.is_clean() {
                    output.success("references are consistent");
                }
            }
            Ok(())
        }

        Commands::Cache(command) => {
            let config = VeritasConfig::load_unvalidated(&cli.config)?;
            init_tracing(&config.logging, cli.verbose);

            let cache = build_cache(&config.cache, Arc::new(SystemClock));
            if !cache.is_enabled() {
                output.warning("the evaluation cache is disabled in configuration");
                return Ok(());
            }

            match command {
                CacheCommands::Stats => {
                    let stats = cache.stats();
                    output.header("Evaluation cache");
                    if let Some(path) = &config.cache.path {
                        output.kv("path", &path.display().to_string());
                    }
                    output.kv("entries", &stats.entry_count.to_string());
                    output.kv("expired", &stats.expired_count.to_string());
                    output.kv("ttl", &format!("{} days", config.cache.ttl_days));
                    if stats.discarded > 0 {
                        output.warning(&format!(
                            "{} invalid entries discarded on load",
                            stats.discarded
                        ));
                    }
                }
                CacheCommands::Clear { force } => {
                    if !force && !output.confirm("Remove every cached evaluation?") {
                        output.info("Cancelled");
                        return Ok(());
                    }
                    cache.clear()?;
                    output.success("cache cleared");
                }
                CacheCommands::Purge => {
                    let removed = cache.purge_expired()?;
                    output.success(&format!("{} expired entries removed", removed));
                }
            }
            Ok(())
        }

        Commands::Config { full, validate } => {
            let config = load_config(&cli.config, &output)?;

            if validate {
                output.success(&format!("{} is valid", cli.config.display()));
            }

            output.header("Configuration");
            output.kv("primary provider", config.policy.primary_provider.as_str());
            output.kv(
                "source targets",
                &format!(
                    "{} general / {} critical",
                    config.policy.general_min_sources, config.policy.critical_min_sources
                ),
            );
            output.kv("reference style", config.references.style.as_str());

            output.subheader("Providers");
            let mut names: Vec<&String> = config.providers.keys().collect();
            names.sort();
            for name in names {
                if let Some(provider) = config.providers.get(name) {
                    let state = if provider.enabled() { "" } else { " (disabled)" };
                    output.list_item(&format!("{}: {}{}", name, provider.type_name(), state));
                }
            }

            output.subheader("Models");
            match &config.models.cheap {
                Some(model) => output.kv("cheap", model.model()),
                None => output.warning("no cheap model configured"),
            }
            if let Some(model) = &config.models.strong {
                output.kv("strong", model.model());
            }

            if full {
                output.subheader("Full configuration");
                println!("{}", toml::to_string_pretty(&config)?);
            }
            Ok(())
        }
    }
}
