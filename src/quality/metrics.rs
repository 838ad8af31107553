//! Aggregate quality metrics over an accepted source set: confidence,
//! category diversity and the quality gate that decides whether drafting
//! should proceed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::heuristics::round1;
use crate::types::{Source, SourceCategory};

const ALL_CATEGORIES: [SourceCategory; 5] = [
    SourceCategory::Consulting,
    SourceCategory::Institutional,
    SourceCategory::Academic,
    SourceCategory::GeneralMedia,
    SourceCategory::Other,
];

/// Score used for sources that were never scored.
const UNSCORED: f32 = 5.0;

// ============= Confidence =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    VeryLow,
    None,
}

impl ConfidenceLevel {
    fn from_score(score: f32) -> Self {
        if score >= 80.0 {
            ConfidenceLevel::High
        } else if score >= 60.0 {
            ConfidenceLevel::Medium
        } else if score >= 40.0 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::VeryLow => "VERY_LOW",
            ConfidenceLevel::None => "NONE",
        }
    }
}

/// Sources per reliability tier (>= 9, >= 8, >= 7, below).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDistribution {
    pub tier1: usize,
    pub tier2: usize,
    pub tier3: usize,
    pub other: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    /// 0-100
    pub score: f32,
    pub level: ConfidenceLevel,
    /// Sources with reliability >= 8
    pub elite_count: usize,
    pub total: usize,
    pub avg_reliability: f32,
    pub avg_relevance: f32,
    pub tier_distribution: TierDistribution,
}

fn scores_or_default(source: &Source) -> (f32, f32) {
    source
        .scores
        .map(|s| (s.reliability, s.relevance))
        .unwrap_or((UNSCORED, UNSCORED))
}

/// Weighted confidence in a source set: 60% reliability, 40% relevance,
/// scaled to 100, plus up to 10 points for the share of elite sources.
pub fn confidence_score(sources: &[Source]) -> ConfidenceReport {
    if sources.is_empty() {
        return ConfidenceReport {
            score: 0.0,
            level: ConfidenceLevel::None,
            elite_count: 0,
            total: 0,
            avg_reliability: 0.0,
            avg_relevance: 0.0,
            tier_distribution: TierDistribution::default(),
        };
    }

    let n = sources.len() as f32;
    let mut tiers = TierDistribution::default();
    let (mut reliability_sum, mut relevance_sum) = (0.0f32, 0.0f32);

    for source in sources {
        let (reliability, relevance) = scores_or_default(source);
        reliability_sum += reliability;
        relevance_sum += relevance;

        if reliability >= 9.0 {
            tiers.tier1 += 1;
        } else if reliability >= 8.0 {
            tiers.tier2 += 1;
        } else if reliability >= 7.0 {
            tiers.tier3 += 1;
        } else {
            tiers.other += 1;
        }
    }

    let avg_reliability = reliability_sum / n;
    let avg_relevance = relevance_sum / n;
    let elite_count = tiers.tier1 + tiers.tier2;

    let base = (avg_reliability * 0.6 + avg_relevance * 0.4) * 10.0;
    let elite_bonus = (elite_count as f32 / n * 15.0).min(10.0);
    let score = (base + elite_bonus).min(100.0).round();

    ConfidenceReport {
        score,
        level: ConfidenceLevel::from_score(score),
        elite_count,
        total: sources.len(),
        avg_reliability: round1(avg_reliability),
        avg_relevance: round1(avg_relevance),
        tier_distribution: tiers,
    }
}

// ============= Diversity =============

/// Unique domains per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub consulting: usize,
    pub institutional: usize,
    pub academic: usize,
    pub general_media: usize,
    pub other: usize,
}

impl CategoryCounts {
    pub fn get(&self, category: SourceCategory) -> usize {
        match category {
            SourceCategory::Consulting => self.consulting,
            SourceCategory::Institutional => self.institutional,
            SourceCategory::Academic => self.academic,
            SourceCategory::GeneralMedia => self.general_media,
            SourceCategory::Other => self.other,
        }
    }

    fn increment(&mut self, category: SourceCategory) {
        match category {
            SourceCategory::Consulting => self.consulting += 1,
            SourceCategory::Institutional => self.institutional += 1,
            SourceCategory::Academic => self.academic += 1,
            SourceCategory::GeneralMedia => self.general_media += 1,
            SourceCategory::Other => self.other += 1,
        }
    }

    fn represented(&self) -> usize {
        ALL_CATEGORIES.iter().filter(|c| self.get(**c) > 0).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityReport {
    /// 0-100, share of categories represented
    pub diversity_score: f32,
    pub distribution: CategoryCounts,
    pub unique_domains: usize,
    pub categories_represented: usize,
    pub warnings: Vec<String>,
}

/// Category mix of a source set. Each domain counts once, under the
/// category of its first source.
pub fn source_diversity(sources: &[Source]) -> DiversityReport {
    if sources.is_empty() {
        return DiversityReport {
            diversity_score: 0.0,
            distribution: CategoryCounts::default(),
            unique_domains: 0,
            categories_represented: 0,
            warnings: vec!["no sources to assess diversity".to_string()],
        };
    }

    let mut seen = HashSet::new();
    let mut counts = CategoryCounts::default();
    for source in sources {
        if seen.insert(source.domain.to_lowercase()) {
            counts.increment(source.category);
        }
    }

    let unique = seen.len();
    let represented = counts.represented();
    let diversity_score = (represented as f32 / ALL_CATEGORIES.len() as f32 * 100.0).round();

    let mut warnings = Vec::new();
    if unique > 3 {
        for category in ALL_CATEGORIES {
            if counts.get(category) as f32 > unique as f32 * 0.5 {
                warnings.push(format!(
                    "more than half of the sources are '{}', consider diversifying",
                    category
                ));
            }
        }
    }
    if represented < 3 && unique >= 5 {
        warnings.push(format!("low diversity: only {} categories", represented));
    }
    if unique < 5 {
        warnings.push(format!(
            "only {} unique domains, consider widening the search",
            unique
        ));
    }
    if counts.institutional + counts.academic == 0 && unique >= 5 {
        warnings.push("no institutional or academic sources".to_string());
    }

    DiversityReport {
        diversity_score,
        distribution: counts,
        unique_domains: unique,
        categories_represented: represented,
        warnings,
    }
}

// ============= Quality Gate =============

/// Thresholds for [`check_quality_gate`] (`[quality_gate]` in `veritas.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityGateConfig {
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,

    #[serde(default = "default_min_avg_reliability")]
    pub min_avg_reliability: f32,

    /// Require at least one source with reliability >= 8
    #[serde(default = "default_true")]
    pub require_elite: bool,

    #[serde(default = "default_max_consulting_ratio")]
    pub max_consulting_ratio: f32,

    #[serde(default = "default_max_general_media_ratio")]
    pub max_general_media_ratio: f32,

    /// Require an institutional or academic source once there are five or more
    #[serde(default = "default_true")]
    pub require_primary_sources: bool,
}

fn default_min_sources() -> usize {
    3
}

fn default_min_avg_reliability() -> f32 {
    6.0
}

fn default_true() -> bool {
    true
}

fn default_max_consulting_ratio() -> f32 {
    0.3
}

fn default_max_general_media_ratio() -> f32 {
    0.1
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_sources: default_min_sources(),
            min_avg_reliability: default_min_avg_reliability(),
            require_elite: true,
            max_consulting_ratio: default_max_consulting_ratio(),
            max_general_media_ratio: default_max_general_media_ratio(),
            require_primary_sources: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

impl QualityIssue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            message: message.into(),
        }
    }
}

/// What the caller should do with a source set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Proceed,
    ProceedWithWarnings,
    RetrySearch,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Proceed => "PROCEED",
            Recommendation::ProceedWithWarnings => "PROCEED_WITH_WARNINGS",
            Recommendation::RetrySearch => "RETRY_SEARCH",
        }
    }

    /// The more cautious of two recommendations.
    pub fn worst(self, other: Recommendation) -> Recommendation {
        fn rank(r: Recommendation) -> u8 {
            match r {
                Recommendation::Proceed => 0,
                Recommendation::ProceedWithWarnings => 1,
                Recommendation::RetrySearch => 2,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGate {
    /// No error-level issues
    pub passed: bool,
    pub issues: Vec<QualityIssue>,
    pub confidence: ConfidenceReport,
    pub diversity: DiversityReport,
    pub recommendation: Recommendation,
}

/// Check whether an accepted set is good enough to draft from.
pub fn check_quality_gate(sources: &[Source], config: &QualityGateConfig) -> QualityGate {
    let confidence = confidence_score(sources);
    let diversity = source_diversity(sources);
    let mut issues = Vec::new();

    if config.min_sources > 0 && sources.len() < config.min_sources {
        issues.push(QualityIssue::error(format!(
            "insufficient sources: {} < {} required",
            sources.len(),
            config.min_sources
        )));
    }

    if confidence.avg_reliability < config.min_avg_reliability {
        issues.push(QualityIssue::error(format!(
            "average reliability {}/10 below {}",
            confidence.avg_reliability, config.min_avg_reliability
        )));
    }

    if config.require_elite && confidence.elite_count == 0 && !sources.is_empty() {
        issues.push(QualityIssue::error(
            "no high-reliability sources (reliability >= 8)",
        ));
    }

    let unique = diversity.unique_domains;
    if unique >= 3 {
        let consulting = diversity.distribution.consulting;
        let ratio = consulting as f32 / unique as f32;
        if ratio > config.max_consulting_ratio {
            issues.push(QualityIssue::error(format!(
                "too many consulting sources: {}/{} ({:.0}%) above {:.0}%",
                consulting,
                unique,
                ratio * 100.0,
                config.max_consulting_ratio * 100.0
            )));
        }

        let media = sources
            .iter()
            .filter(|s| s.category == SourceCategory::GeneralMedia)
            .count();
        let ratio = media as f32 / unique as f32;
        if ratio > config.max_general_media_ratio {
            issues.push(QualityIssue::error(format!(
                "too many general media sources: {}/{} ({:.0}%) above {:.0}%",
                media,
                unique,
                ratio * 100.0,
                config.max_general_media_ratio * 100.0
            )));
        }
    }

    let primary = diversity.distribution.institutional + diversity.distribution.academic;
    let primary_missing = config.require_primary_sources && unique >= 5 && primary == 0;
    if primary_missing {
        issues.push(QualityIssue::error(
            "at least one institutional or academic source is required",
        ));
    }

    for warning in &diversity.warnings {
        // Already reported as an error above
        if primary_missing && warning.starts_with("no institutional") {
            continue;
        }
        issues.push(QualityIssue::warning(warning.clone()));
    }

    let errors = issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Error)
        .count();
    let recommendation = if issues.is_empty() {
        Recommendation::Proceed
    } else if errors == 0 {
        Recommendation::ProceedWithWarnings
    } else {
        Recommendation::RetrySearch
    };

    QualityGate {
        passed: errors == 0,
        issues,
        confidence,
        diversity,
        recommendation,
    }
}
