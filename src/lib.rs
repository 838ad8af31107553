//! # Veritas - source acquisition and reference consolidation
//!
//! Veritas finds web sources for research topics, scores each one for
//! authenticity, reliability, relevance and currency, and keeps only the
//! ones worth citing. A second stage merges the locally numbered reference
//! lists of drafted chapters into one global list and rewrites every
//! in-text citation to match.
//!
//! ## Overview
//!
//! Veritas can be used in two ways:
//!
//! 1. **As a command line tool** - Run the `veritas` binary
//! 2. **As a library** - Import components into your own Rust project
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use veritas::{ResearchCoordinator, SearchRequest, VeritasConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VeritasConfig::load("veritas.toml")?;
//!     let coordinator = ResearchCoordinator::from_config(&config).await?;
//!
//!     let outcome = coordinator
//!         .gather(&SearchRequest::new("grid-scale battery storage", "market"))
//!         .await?;
//!     println!("{} sources, {}", outcome.accepted.len(), outcome.recommendation);
//!     Ok(())
//! }
//! ```
//!
//! ### Consolidating Chapters
//!
//! ```rust,ignore
//! use veritas::references::{ChapterInput, ReferenceConsolidator};
//!
//! let chapters = vec![
//!     ChapterInput::from_markdown("Market", &market_md),
//!     ChapterInput::from_markdown("Competition", &competition_md),
//! ];
//! let (markdown, document) = ReferenceConsolidator::default().consolidate_to_markdown(&chapters);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local evaluation models (default) |
//! | `minimal` | Build without optional backends |
//!
//! ## Modules
//!
//! - [`search`] - URL canonicalization, search policy and the orchestrator
//! - [`quality`] - source evaluation, caching and quality metrics
//! - [`providers`] - search and content-extraction backends
//! - [`references`] - reference extraction, consolidation and validation
//! - [`research`] - high-level coordination of the above
//! - [`llm`] - chat clients used as evaluation models

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Command line interface.
pub mod cli;
/// LLM provider clients.
pub mod llm;
/// Search and content-extraction providers.
pub mod providers;
/// Source quality evaluation.
pub mod quality;
/// Reference consolidation for multi-chapter documents.
pub mod references;
/// Topic runs and chapter consolidation.
pub mod research;
/// Shared retry policy for external calls.
pub mod retry;
/// Source acquisition.
pub mod search;
/// Core types (sources, scores, errors).
pub mod types;
/// Configuration and clock utilities.
pub mod utils;

// Re-export commonly used types
pub use llm::{LLMClient, Provider};
pub use providers::{ContentExtractor, ProviderRegistry, SearchProvider};
pub use quality::{EvaluationModel, SourceEvaluator};
pub use references::{ChapterInput, ConsolidatedDocument, ReferenceConsolidator};
pub use research::ResearchCoordinator;
pub use search::{SearchOrchestrator, SearchOutcome, SearchRequest};
pub use types::{AppError, Result, Source};
pub use utils::toml_config::VeritasConfig;
