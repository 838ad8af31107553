//! Source quality evaluator
//!
//! Decides keep/reject for each candidate source, spending model calls only
//! where they change the outcome:
//!
//! 1. **Auto-reject** - social media and similar domains, no model call
//! 2. **Fast-track** - allow-listed domains get table scores plus
//!    deterministic relevance/currency, never a model call
//! 3. **Cache** - a non-expired decision for the canonical URL is reused
//! 4. **Tiered scoring** - the cheap model scores first; totals inside the
//!    gray zone, an explicit review request, or a critical playbook send the
//!    source to the strong model
//! 5. **Cache write** keyed by canonical URL
//! 6. **Category floors** - consulting and general media need higher
//!    relevance, strong institutional sources are rescued
//!
//! Any model failure rejects that source alone; nothing propagates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Datelike;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cache::{EvaluationCache, EvaluationCacheEntry};
use super::domains::{
    auto_reject_match, classify_category, consulting_priority, elite_domain, is_methodological,
};
use super::heuristics::{estimate_currency, quick_relevance};
use super::judge::{EvaluationModel, ModelVerdict};
use super::scoring::{
    category_adjustment, compose_scores, CategoryFloors, CategoryProfile, ScoreWeights,
};
use crate::search::canonical::{canonicalize_url, extract_domain};
use crate::types::{Source, SourceCategory, SourceScores};
use crate::utils::clock::Clock;

// ============= Configuration =============

/// Evaluator thresholds (`[evaluator]` in `veritas.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluatorConfig {
    #[serde(default)]
    pub weights: ScoreWeights,

    #[serde(default)]
    pub floors: CategoryFloors,

    /// Totals at or below this are rejected without escalation
    #[serde(default = "default_gray_zone_low")]
    pub gray_zone_low: f32,

    /// Totals at or above this are decided without escalation
    #[serde(default = "default_gray_zone_high")]
    pub gray_zone_high: f32,

    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f32,

    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,

    #[serde(default = "default_min_authenticity")]
    pub min_authenticity: f32,

    #[serde(default = "default_min_reliability")]
    pub min_reliability: f32,

    #[serde(default = "default_true")]
    pub fast_track_enabled: bool,

    /// Minimum total for an allow-listed source
    #[serde(default = "default_fast_track_accept")]
    pub fast_track_accept: f32,

    /// Share of the accepted set general media may occupy
    #[serde(default = "default_general_media_max_ratio")]
    pub general_media_max_ratio: f32,

    #[serde(default = "default_max_concurrent_evaluations")]
    pub max_concurrent_evaluations: usize,
}

fn default_gray_zone_low() -> f32 {
    5.5
}

fn default_gray_zone_high() -> f32 {
    7.5
}

fn default_accept_threshold() -> f32 {
    7.0
}

fn default_min_relevance() -> f32 {
    8.0
}

fn default_min_authenticity() -> f32 {
    6.0
}

fn default_min_reliability() -> f32 {
    6.0
}

fn default_true() -> bool {
    true
}

fn default_fast_track_accept() -> f32 {
    6.5
}

fn default_general_media_max_ratio() -> f32 {
    0.1
}

fn default_max_concurrent_evaluations() -> usize {
    8
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            floors: CategoryFloors::default(),
            gray_zone_low: default_gray_zone_low(),
            gray_zone_high: default_gray_zone_high(),
            accept_threshold: default_accept_threshold(),
            min_relevance: default_min_relevance(),
            min_authenticity: default_min_authenticity(),
            min_reliability: default_min_reliability(),
            fast_track_enabled: default_true(),
            fast_track_accept: default_fast_track_accept(),
            general_media_max_ratio: default_general_media_max_ratio(),
            max_concurrent_evaluations: default_max_concurrent_evaluations(),
        }
    }
}

impl EvaluatorConfig {
    pub fn in_gray_zone(&self, total: f32) -> bool {
        total > self.gray_zone_low && total < self.gray_zone_high
    }
}

// ============= Results =============

/// How a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationPath {
    AutoReject,
    FastTrack,
    Cached,
    CheapModel,
    StrongModel,
    Failed,
}

/// Outcome for one source. `source` carries the scores and category.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub source: Source,
    pub keep: bool,
    pub path: EvaluationPath,
}

/// Counters across the evaluator's lifetime.
#[derive(Debug, Default)]
pub struct EvaluatorStats {
    pub auto_rejected: AtomicU64,
    pub fast_tracked: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cheap_calls: AtomicU64,
    pub strong_calls: AtomicU64,
    pub failures: AtomicU64,
}

/// Plain copy of [`EvaluatorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorStatsSnapshot {
    pub auto_rejected: u64,
    pub fast_tracked: u64,
    pub cache_hits: u64,
    pub cheap_calls: u64,
    pub strong_calls: u64,
    pub failures: u64,
}

impl EvaluatorStats {
    pub fn snapshot(&self) -> EvaluatorStatsSnapshot {
        EvaluatorStatsSnapshot {
            auto_rejected: self.auto_rejected.load(Ordering::Relaxed),
            fast_tracked: self.fast_tracked.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cheap_calls: self.cheap_calls.load(Ordering::Relaxed),
            strong_calls: self.strong_calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Total number of model invocations.
    pub fn model_calls(&self) -> u64 {
        self.cheap_calls.load(Ordering::Relaxed) + self.strong_calls.load(Ordering::Relaxed)
    }
}

// ============= Evaluator =============

pub struct SourceEvaluator {
    config: EvaluatorConfig,
    cheap: Arc<dyn EvaluationModel>,
    strong: Option<Arc<dyn EvaluationModel>>,
    cache: Arc<dyn EvaluationCache>,
    clock: Arc<dyn Clock>,
    cache_ttl: chrono::Duration,
    stats: EvaluatorStats,
}

impl SourceEvaluator {
    pub fn new(
        config: EvaluatorConfig,
        cheap: Arc<dyn EvaluationModel>,
        cache: Arc<dyn EvaluationCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            cheap,
            strong: None,
            cache,
            clock,
            cache_ttl: chrono::Duration::days(7),
            stats: EvaluatorStats::default(),
        }
    }

    /// Add the second-tier model used for gray-zone and critical sources.
    pub fn with_strong(mut self, strong: Arc<dyn EvaluationModel>) -> Self {
        self.strong = Some(strong);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn stats(&self) -> &EvaluatorStats {
        &self.stats
    }

    pub fn cache(&self) -> &Arc<dyn EvaluationCache> {
        &self.cache
    }

    /// Evaluate one source for `topic`. `critical` forces strong-model
    /// review of every non-fast-tracked source.
    pub async fn evaluate(&self, mut source: Source, topic: &str, critical: bool) -> Evaluation {
        if source.canonical_url.is_empty() {
            source.canonical_url = canonicalize_url(&source.url);
        }
        if source.domain.is_empty() {
            source.domain = extract_domain(&source.url);
        }
        if source.canonical_url.is_empty() {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            warn!("Rejecting source with unusable URL '{}'", source.url);
            source.reasoning = Some("unusable URL".to_string());
            return Evaluation {
                source,
                keep: false,
                path: EvaluationPath::Failed,
            };
        }

        source.category = classify_category(&source.url, &source.domain);

        // 1. Auto-reject
        if let Some(matched) = auto_reject_match(&source.url) {
            self.stats.auto_rejected.fetch_add(1, Ordering::Relaxed);
            debug!("Auto-reject {} ({})", source.canonical_url, matched);
            let scores = SourceScores {
                authenticity: 0.0,
                reliability: 0.0,
                relevance: 0.0,
                currency: 0.0,
                total: 0.0,
            };
            let reasoning = format!("domain on the auto-reject list: {}", matched);
            return self.finish(source, scores, false, reasoning, EvaluationPath::AutoReject);
        }

        // 2. Fast-track
        if self.config.fast_track_enabled {
            if let Some(elite) = elite_domain(&source.url) {
                self.stats.fast_tracked.fetch_add(1, Ordering::Relaxed);
                let relevance = quick_relevance(topic, &source.title, &source.snippet);
                let currency =
                    estimate_currency(&source.title, &source.snippet, self.clock.now().year());
                let profile = self.profile(&source);
                let adjustment = category_adjustment(&profile, relevance, &self.config.floors);
                let scores = compose_scores(
                    &self.config.weights,
                    elite.authenticity,
                    elite.reliability,
                    relevance,
                    currency,
                    adjustment,
                );

                let keep = scores.total >= self.config.fast_track_accept;
                let (keep, note) =
                    self.apply_category_floors(keep, source.category, &scores, false);
                debug!(
                    "Fast-track {} (tier {}): total {:.1} keep={}",
                    elite.domain, elite.tier, scores.total, keep
                );
                source.fast_track = Some(elite.tier);
                let reasoning = format!(
                    "allow-listed domain {} (tier {}), total {:.1}{}",
                    elite.domain, elite.tier, scores.total, note
                );
                return self.finish(source, scores, keep, reasoning, EvaluationPath::FastTrack);
            }
        }

        // 3. Cache
        if let Some(entry) = self.cache.get(&source.canonical_url) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Evaluation cache hit for {}", source.canonical_url);
            source.scores = Some(entry.scores);
            source.reasoning = Some(entry.reasoning);
            source.fast_track = entry.fast_track;
            return Evaluation {
                source,
                keep: entry.keep,
                path: EvaluationPath::Cached,
            };
        }

        // 4. Tiered scoring
        let profile = self.profile(&source);
        self.stats.cheap_calls.fetch_add(1, Ordering::Relaxed);
        let cheap = match self.cheap.evaluate(&source, topic).await {
            Ok(verdict) => verdict,
            Err(e) => return self.failed(source, self.cheap.label(), e.to_string()),
        };
        let cheap_scores = self.verdict_scores(&cheap, &profile);

        let escalate =
            critical || cheap.needs_detailed_review || self.config.in_gray_zone(cheap_scores.total);

        let (verdict, scores, path) = match (&self.strong, escalate) {
            (Some(strong), true) => {
                self.stats.strong_calls.fetch_add(1, Ordering::Relaxed);
                match strong.evaluate(&source, topic).await {
                    Ok(verdict) => {
                        let scores = self.verdict_scores(&verdict, &profile);
                        (verdict, scores, EvaluationPath::StrongModel)
                    }
                    Err(e) => return self.failed(source, strong.label(), e.to_string()),
                }
            }
            _ => (cheap, cheap_scores, EvaluationPath::CheapModel),
        };

        let keep = if path == EvaluationPath::CheapModel
            && scores.total <= self.config.gray_zone_low
        {
            false
        } else {
            self.passes_thresholds(&verdict, &scores)
        };
        let (keep, note) =
            self.apply_category_floors(keep, source.category, &scores, verdict.is_clickbait);

        let reasoning = if verdict.reasoning.is_empty() {
            format!("total {:.1}{}", scores.total, note)
        } else {
            format!("{}{}", verdict.reasoning, note)
        };
        self.finish(source, scores, keep, reasoning, path)
    }

    /// Evaluate many sources with bounded concurrency, preserving input
    /// order. Returns `(accepted, rejected)`.
    pub async fn evaluate_batch(
        &self,
        sources: Vec<Source>,
        topic: &str,
        critical: bool,
    ) -> (Vec<Source>, Vec<Source>) {
        let limit = self.config.max_concurrent_evaluations.max(1);
        let evaluations: Vec<Evaluation> = stream::iter(sources)
            .map(|source| self.evaluate(source, topic, critical))
            .buffered(limit)
            .collect()
            .await;

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for evaluation in evaluations {
            if evaluation.keep {
                accepted.push(evaluation.source);
            } else {
                rejected.push(evaluation.source);
            }
        }
        (accepted, rejected)
    }

    /// Cap general media to its share of the accepted set, keeping the
    /// highest totals. Returns the sources that were dropped.
    pub fn enforce_category_caps(&self, accepted: &mut Vec<Source>) -> Vec<Source> {
        let ratio = self.config.general_media_max_ratio;
        let media: Vec<usize> = accepted
            .iter()
            .enumerate()
            .filter(|(_, s)| s.category == SourceCategory::GeneralMedia)
            .map(|(i, _)| i)
            .collect();

        let allowed = if ratio <= 0.0 {
            0
        } else {
            ((accepted.len() as f32 * ratio).floor() as usize).max(1)
        };
        if media.len() <= allowed {
            return Vec::new();
        }

        let mut ranked = media.clone();
        ranked.sort_by(|a, b| {
            accepted[*b]
                .total_score()
                .partial_cmp(&accepted[*a].total_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let dropped_idx: std::collections::HashSet<usize> =
            ranked.into_iter().skip(allowed).collect();

        let mut kept = Vec::with_capacity(accepted.len());
        let mut dropped = Vec::new();
        for (i, source) in accepted.drain(..).enumerate() {
            if dropped_idx.contains(&i) {
                dropped.push(source);
            } else {
                kept.push(source);
            }
        }
        *accepted = kept;

        info!(
            "General media cap: dropped {} of {} media sources (allowed {})",
            dropped.len(),
            media.len(),
            allowed
        );
        dropped
    }

    fn profile(&self, source: &Source) -> CategoryProfile {
        CategoryProfile {
            category: source.category,
            methodological: is_methodological(&source.url, &source.domain),
            consulting_priority: consulting_priority(&source.url, &source.domain),
        }
    }

    fn verdict_scores(&self, verdict: &ModelVerdict, profile: &CategoryProfile) -> SourceScores {
        let adjustment = category_adjustment(profile, verdict.relevance, &self.config.floors);
        compose_scores(
            &self.config.weights,
            verdict.authenticity,
            verdict.reliability,
            verdict.relevance,
            verdict.currency,
            adjustment,
        )
    }

    fn passes_thresholds(&self, verdict: &ModelVerdict, scores: &SourceScores) -> bool {
        let c = &self.config;
        if verdict.is_clickbait
            || scores.total < c.accept_threshold
            || scores.authenticity < c.min_authenticity
        {
            return false;
        }
        let standard =
            scores.relevance >= c.min_relevance && scores.reliability >= c.min_reliability;
        // Highly reliable publishers pass with moderate relevance
        let trusted = scores.reliability >= 8.0 && scores.relevance >= 6.0;
        standard || trusted
    }

    /// Hard per-category rules applied after scoring.
    fn apply_category_floors(
        &self,
        keep: bool,
        category: SourceCategory,
        scores: &SourceScores,
        clickbait: bool,
    ) -> (bool, String) {
        let floors = &self.config.floors;
        match category {
            SourceCategory::Consulting
                if keep && scores.relevance < floors.consulting_min_relevance =>
            {
                (
                    false,
                    format!(
                        " | consulting requires relevance >= {}",
                        floors.consulting_min_relevance
                    ),
                )
            }
            SourceCategory::GeneralMedia
                if keep && scores.relevance < floors.general_media_min_relevance =>
            {
                (
                    false,
                    format!(
                        " | general media requires relevance >= {}",
                        floors.general_media_min_relevance
                    ),
                )
            }
            SourceCategory::Institutional
                if !keep
                    && !clickbait
                    && scores.relevance >= floors.institutional_min_relevance
                    && scores.total >= self.config.accept_threshold - 0.5 =>
            {
                (true, " | institutional source with strong scores".to_string())
            }
            _ => (keep, String::new()),
        }
    }

    fn finish(
        &self,
        mut source: Source,
        scores: SourceScores,
        keep: bool,
        reasoning: String,
        path: EvaluationPath,
    ) -> Evaluation {
        let now = self.clock.now();
        let entry = EvaluationCacheEntry {
            canonical_url: source.canonical_url.clone(),
            scores,
            keep,
            category: source.category,
            reasoning: reasoning.clone(),
            fast_track: source.fast_track,
            evaluated_at: now,
            expires_at: now + self.cache_ttl,
        };
        if let Err(e) = self.cache.upsert(entry) {
            warn!("Could not cache evaluation for {}: {}", source.canonical_url, e);
        }

        source.scores = Some(scores);
        source.reasoning = Some(reasoning);
        Evaluation { source, keep, path }
    }

    fn failed(&self, mut source: Source, model: String, error: String) -> Evaluation {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Evaluation of {} by {} failed, rejecting: {}",
            source.canonical_url, model, error
        );
        source.reasoning = Some(format!("evaluation failed: {}", error));
        Evaluation {
            source,
            keep: false,
            path: EvaluationPath::Failed,
        }
    }
}
