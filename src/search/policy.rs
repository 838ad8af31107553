//! Search policy
//!
//! Pure decision logic, no I/O. Given a report type and topic the policy
//! picks a [`Playbook`]: an ordered list of search steps, a minimum number of
//! accepted sources and an enrichment budget. The orchestrator consults
//! [`SearchPolicy::should_escalate`] after every step and
//! [`SearchPolicy::should_call_booster`] once the steps are exhausted.
//!
//! Topic selection is data-driven: [`TopicRule`]s are tried in order and the
//! first whose keywords appear in the topic (on word boundaries) wins.
//!
//! ```ignore
//! let policy = SearchPolicy::new(PolicyConfig::default());
//! let playbook = policy.select_playbook("Strategy", "renewable energy in Spain");
//! assert_eq!(playbook.archetype, PlaybookArchetype::CriticalStrategy);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::types::{AppError, Result, Source};

// ============= Types =============

/// Search backends a step can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Tavily,
    Exa,
    DuckDuckGo,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Tavily => "tavily",
            ProviderKind::Exa => "exa",
            ProviderKind::DuckDuckGo => "duckduckgo",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStep {
    pub provider: ProviderKind,
    pub depth: SearchDepth,
    pub max_queries: usize,
    pub results_per_query: usize,
}

impl SearchStep {
    pub const fn new(
        provider: ProviderKind,
        depth: SearchDepth,
        max_queries: usize,
        results_per_query: usize,
    ) -> Self {
        Self {
            provider,
            depth,
            max_queries,
            results_per_query,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookArchetype {
    HardFacts,
    DeepTechnical,
    GeneralMarket,
    CriticalStrategy,
}

impl PlaybookArchetype {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybookArchetype::HardFacts => "HARD_FACTS",
            PlaybookArchetype::DeepTechnical => "DEEP_TECH",
            PlaybookArchetype::GeneralMarket => "GENERAL_MARKET",
            PlaybookArchetype::CriticalStrategy => "CRITICAL_STRATEGY",
        }
    }
}

/// The search plan for one topic. Fixed once selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    pub archetype: PlaybookArchetype,
    pub minimum_source_target: usize,
    pub preferred_range: (usize, usize),
    pub steps: Vec<SearchStep>,
    pub max_enrichment_pages: usize,
    pub is_critical: bool,
}

impl Playbook {
    pub fn uses_provider(&self, provider: ProviderKind) -> bool {
        self.steps.iter().any(|s| s.provider == provider)
    }

    /// Reject plans the orchestrator cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.minimum_source_target == 0 {
            return Err(AppError::PolicyViolation(format!(
                "playbook {} has a zero source target",
                self.name
            )));
        }
        if self.steps.is_empty() {
            return Err(AppError::PolicyViolation(format!(
                "playbook {} has no steps",
                self.name
            )));
        }
        if let Some(i) = self
            .steps
            .iter()
            .position(|s| s.max_queries == 0 || s.results_per_query == 0)
        {
            return Err(AppError::PolicyViolation(format!(
                "playbook {} step {} requests zero queries or results",
                self.name,
                i + 1
            )));
        }
        if self.preferred_range.0 > self.preferred_range.1 {
            return Err(AppError::PolicyViolation(format!(
                "playbook {} has an inverted preferred range {:?}",
                self.name, self.preferred_range
            )));
        }
        Ok(())
    }
}

/// Topic keywords that select an archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRule {
    pub archetype: PlaybookArchetype,
    pub keywords: Vec<String>,
}

impl TopicRule {
    pub fn new(archetype: PlaybookArchetype, keywords: &[&str]) -> Self {
        Self {
            archetype,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// True when any keyword occurs in `topic` as a whole word or phrase.
    pub fn matches(&self, topic: &str) -> bool {
        self.keywords.iter().any(|kw| contains_word(topic, kw))
    }
}

fn contains_word(text: &str, keyword: &str) -> bool {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return false;
    }
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword)))
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

pub fn default_topic_rules() -> Vec<TopicRule> {
    vec![
        TopicRule::new(
            PlaybookArchetype::HardFacts,
            &[
                "regulation",
                "standard",
                "iso",
                "law",
                "legislation",
                "cagr",
                "revenue",
                "market size",
            ],
        ),
        TopicRule::new(
            PlaybookArchetype::DeepTechnical,
            &["ai", "quantum", "biotech", "semiconductor", "innovation"],
        ),
    ]
}

fn default_critical_report_types() -> Vec<String> {
    ["Strategy", "Financial", "Due_Diligence", "Strategic"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Provider used when planned steps fall short of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoosterConfig {
    #[serde(default = "default_booster_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_booster_results")]
    pub results: usize,
}

fn default_booster_provider() -> ProviderKind {
    ProviderKind::Exa
}

fn default_booster_results() -> usize {
    15
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            provider: default_booster_provider(),
            results: default_booster_results(),
        }
    }
}

/// Policy settings (`[policy]` in `veritas.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_general_min_sources")]
    pub general_min_sources: usize,

    #[serde(default = "default_critical_min_sources")]
    pub critical_min_sources: usize,

    /// Sources with less content than this are enrichment candidates
    #[serde(default = "default_enrichment_min_content_chars")]
    pub enrichment_min_content_chars: usize,

    #[serde(default = "default_max_enrichment_general")]
    pub max_enrichment_pages_general: usize,

    #[serde(default = "default_max_enrichment_critical")]
    pub max_enrichment_pages_critical: usize,

    /// Forces the depth of every primary-provider step
    #[serde(default)]
    pub depth_override: Option<SearchDepth>,

    #[serde(default = "default_primary_provider")]
    pub primary_provider: ProviderKind,

    #[serde(default = "default_critical_report_types")]
    pub critical_report_types: Vec<String>,

    #[serde(default = "default_topic_rules")]
    pub topic_rules: Vec<TopicRule>,

    /// `None` disables the booster
    #[serde(default = "default_booster")]
    pub booster: Option<BoosterConfig>,
}

fn default_general_min_sources() -> usize {
    7
}

fn default_critical_min_sources() -> usize {
    10
}

fn default_enrichment_min_content_chars() -> usize {
    3000
}

fn default_max_enrichment_general() -> usize {
    5
}

fn default_max_enrichment_critical() -> usize {
    7
}

fn default_primary_provider() -> ProviderKind {
    ProviderKind::Tavily
}

fn default_booster() -> Option<BoosterConfig> {
    Some(BoosterConfig::default())
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            general_min_sources: default_general_min_sources(),
            critical_min_sources: default_critical_min_sources(),
            enrichment_min_content_chars: default_enrichment_min_content_chars(),
            max_enrichment_pages_general: default_max_enrichment_general(),
            max_enrichment_pages_critical: default_max_enrichment_critical(),
            depth_override: None,
            primary_provider: default_primary_provider(),
            critical_report_types: default_critical_report_types(),
            topic_rules: default_topic_rules(),
            booster: default_booster(),
        }
    }
}

// ============= Hard facts =============

static HARD_FACT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\d+%",
        r"\$\d+",
        r"€\d+",
        r"(?i)CAGR",
        r"(?i)Regulation",
        r"(?i)Directive",
        r"(?i)ISO\s\d+",
        r"(?i)10-K",
        r"(?i)Annual Report",
        r"\b(19|20)\d{2}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid hard-fact pattern"))
    .collect()
});

/// True when the text carries figures, currency amounts, regulatory
/// references or years.
pub fn has_hard_facts(text: &str) -> bool {
    HARD_FACT_PATTERNS.iter().any(|re| re.is_match(text))
}

// ============= Policy =============

#[derive(Debug, Clone, Default)]
pub struct SearchPolicy {
    config: PolicyConfig,
}

impl SearchPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn is_critical_report(&self, report_type: &str) -> bool {
        self.config
            .critical_report_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(report_type.trim()))
    }

    fn primary_depth(&self, preferred: SearchDepth) -> SearchDepth {
        self.config.depth_override.unwrap_or(preferred)
    }

    fn primary(&self, depth: SearchDepth, max_queries: usize, results: usize) -> SearchStep {
        SearchStep::new(
            self.config.primary_provider,
            self.primary_depth(depth),
            max_queries,
            results,
        )
    }

    /// Archetype for a topic, from the rule table or the report type.
    pub fn classify(&self, report_type: &str, topic: &str) -> PlaybookArchetype {
        self.config
            .topic_rules
            .iter()
            .find(|rule| rule.matches(topic))
            .map(|rule| rule.archetype)
            .unwrap_or_else(|| {
                if self.is_critical_report(report_type) {
                    PlaybookArchetype::CriticalStrategy
                } else {
                    PlaybookArchetype::GeneralMarket
                }
            })
    }

    pub fn select_playbook(&self, report_type: &str, topic: &str) -> Playbook {
        let critical = self.is_critical_report(report_type);
        let archetype = self.classify(report_type, topic);
        self.build_playbook(archetype, critical)
    }

    pub fn build_playbook(&self, archetype: PlaybookArchetype, critical: bool) -> Playbook {
        let c = &self.config;
        let (target, range, pages) = if critical {
            (c.critical_min_sources, (10, 15), c.max_enrichment_pages_critical)
        } else {
            (c.general_min_sources, (7, 10), c.max_enrichment_pages_general)
        };

        let (target, range, steps, pages, is_critical) = match archetype {
            PlaybookArchetype::HardFacts => (
                target,
                range,
                vec![self.primary(SearchDepth::Basic, 6, 5)],
                pages,
                critical,
            ),
            PlaybookArchetype::DeepTechnical => (
                c.general_min_sources,
                (7, 10),
                vec![
                    self.primary(SearchDepth::Basic, 3, 5),
                    SearchStep::new(ProviderKind::Exa, SearchDepth::Basic, 2, 10),
                ],
                c.max_enrichment_pages_critical,
                critical,
            ),
            PlaybookArchetype::CriticalStrategy => (
                c.critical_min_sources,
                (10, 15),
                vec![
                    self.primary(SearchDepth::Basic, 8, 8),
                    self.primary(SearchDepth::Advanced, 6, 10),
                ],
                c.max_enrichment_pages_critical,
                true,
            ),
            PlaybookArchetype::GeneralMarket => (
                c.general_min_sources,
                (7, 10),
                vec![
                    self.primary(SearchDepth::Basic, 6, 5),
                    self.primary(SearchDepth::Advanced, 4, 8),
                ],
                c.max_enrichment_pages_general,
                false,
            ),
        };

        Playbook {
            name: archetype.name().to_string(),
            archetype,
            minimum_source_target: target,
            preferred_range: range,
            steps,
            max_enrichment_pages: pages,
            is_critical,
        }
    }

    /// Run the next step only while below target and steps remain.
    pub fn should_escalate(&self, accepted: usize, step_index: usize, playbook: &Playbook) -> bool {
        accepted < playbook.minimum_source_target && step_index + 1 < playbook.steps.len()
    }

    pub fn should_call_booster(&self, accepted: usize, playbook: &Playbook) -> bool {
        accepted < playbook.minimum_source_target
    }

    /// Booster to run after the planned steps, if any. Skipped when the
    /// playbook already searched with the booster provider.
    pub fn booster_for(&self, accepted: usize, playbook: &Playbook) -> Option<BoosterConfig> {
        let booster = self.config.booster?;
        if !self.should_call_booster(accepted, playbook)
            || playbook.uses_provider(booster.provider)
        {
            return None;
        }
        Some(booster)
    }

    /// Accepted sources worth fetching in full, highest priority first:
    /// thin content (10), hard facts in title or snippet (5), any source in
    /// a critical playbook (1). Ties keep their input order.
    pub fn select_enrichment_candidates<'a>(
        &self,
        sources: &'a [Source],
        playbook: &Playbook,
    ) -> Vec<&'a Source> {
        let mut candidates: Vec<(&Source, u8)> = sources
            .iter()
            .filter_map(|source| {
                let priority = if source.content_len() < self.config.enrichment_min_content_chars {
                    10
                } else if has_hard_facts(&format!("{} {}", source.title, source.snippet)) {
                    5
                } else if playbook.is_critical {
                    1
                } else {
                    return None;
                };
                Some((source, priority))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates
            .into_iter()
            .take(playbook.max_enrichment_pages)
            .map(|(source, _)| source)
            .collect()
    }
}
