//! Source acquisition
//!
//! - [`canonical`] - URL identity used for dedup and caching
//! - [`policy`] - playbook selection, escalation and enrichment rules
//! - [`orchestrator`] - executes a playbook against the configured providers

pub mod canonical;
pub mod orchestrator;
pub mod policy;

pub use canonical::{canonicalize_url, extract_domain, title_from_url};
pub use orchestrator::{
    SearchConfig, SearchMetrics, SearchOrchestrator, SearchOutcome, SearchRequest,
};
pub use policy::{
    BoosterConfig, Playbook, PlaybookArchetype, PolicyConfig, ProviderKind, SearchDepth,
    SearchPolicy, SearchStep,
};
