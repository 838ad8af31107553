//! Research coordination
//!
//! [`coordinator::ResearchCoordinator`] is the entry point for callers that
//! want the whole pipeline: it builds the search orchestrator from
//! configuration, runs topics (concurrently when asked) and merges drafted
//! chapters through the reference consolidator.
//!
//! # Usage
//!
//! ```ignore
//! use veritas::research::coordinator::ResearchCoordinator;
//! use veritas::search::SearchRequest;
//!
//! let coordinator = ResearchCoordinator::from_config(&config).await?;
//! let outcome = coordinator
//!     .gather(&SearchRequest::new("grid-scale battery storage", "market"))
//!     .await?;
//!
//! for source in &outcome.accepted {
//!     println!("{:.1} {}", source.total_score(), source.url);
//! }
//! ```

/// Topic runs and chapter consolidation.
pub mod coordinator;

pub use coordinator::ResearchCoordinator;
