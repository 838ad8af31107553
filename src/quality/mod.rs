//! Source quality evaluation
//!
//! - [`domains`] - allow-list, auto-reject list and category keywords
//! - [`heuristics`] - deterministic relevance and currency estimates
//! - [`scoring`] - weighted totals and category adjustments
//! - [`cache`] - evaluation decisions keyed by canonical URL
//! - [`judge`] - model-backed scoring and verdict parsing
//! - [`evaluator`] - the keep/reject pipeline
//! - [`metrics`] - confidence, diversity and the quality gate

pub mod cache;
pub mod domains;
pub mod evaluator;
pub mod heuristics;
pub mod judge;
pub mod metrics;
pub mod scoring;

pub use cache::{
    build_cache, CacheConfig, CacheStats, EvaluationCache, EvaluationCacheEntry,
    FileEvaluationCache, InMemoryEvaluationCache, NoOpEvaluationCache,
};
pub use evaluator::{Evaluation, EvaluationPath, EvaluatorConfig, SourceEvaluator};
pub use judge::{EvaluationError, EvaluationModel, LlmJudge, ModelVerdict};
pub use metrics::{check_quality_gate, QualityGate, QualityGateConfig, Recommendation};
