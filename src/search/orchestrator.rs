//! Search orchestration
//!
//! A run executes the steps of the selected playbook in order. Each step
//! fans its queries out to one provider under a semaphore, canonicalizes and
//! dedups the hits against everything seen so far in the run, and hands the
//! new sources to the [`SourceEvaluator`]. The run stops escalating once the
//! accepted count reaches the playbook target, optionally calls the booster,
//! then enriches the most promising sources through the extractor chain.
//!
//! Nothing inside a run is fatal: failed queries are logged and skipped, a
//! step where every query failed is logged as an outage, and providers whose
//! circuit breaker opened are skipped for the rest of the process.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use futures::stream::{self, StreamExt};

use crate::providers::{
    truncate_chars, CircuitBreakers, ProviderError, ProviderRegistry, SearchHit, SearchProvider,
};
use crate::quality::metrics::{check_quality_gate, QualityGate, QualityGateConfig, Recommendation};
use crate::quality::SourceEvaluator;
use crate::retry::RetryPolicy;
use crate::search::canonical::{canonicalize_url, extract_domain};
use crate::search::policy::{Playbook, ProviderKind, SearchDepth, SearchPolicy};
use crate::types::{AppError, Result, Source, SourceCategory};
use crate::utils::clock::{Clock, SystemClock};

// ============= Configuration =============

/// Run-level search settings (`[search]` in `veritas.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Queries in flight at once within a step
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    /// Pause before dispatching when every permit is taken
    #[serde(default = "default_dispatch_delay_ms")]
    pub dispatch_delay_ms: u64,

    /// Hosts whose results are dropped before evaluation. Subdomains match.
    #[serde(default)]
    pub excluded_domains: Vec<String>,

    /// Consecutive rate limits before a provider is disabled
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    #[serde(default = "default_enrichment_enabled")]
    pub enrichment_enabled: bool,

    /// Content kept per source, in characters
    #[serde(default = "default_max_chars_per_source")]
    pub max_chars_per_source: usize,
}

fn default_max_concurrent_queries() -> usize {
    4
}

fn default_dispatch_delay_ms() -> u64 {
    250
}

fn default_breaker_threshold() -> u32 {
    3
}

fn default_enrichment_enabled() -> bool {
    true
}

fn default_max_chars_per_source() -> usize {
    30_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
            dispatch_delay_ms: default_dispatch_delay_ms(),
            excluded_domains: Vec::new(),
            breaker_threshold: default_breaker_threshold(),
            enrichment_enabled: default_enrichment_enabled(),
            max_chars_per_source: default_max_chars_per_source(),
        }
    }
}

impl SearchConfig {
    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }

    /// Whether `domain` is one of the excluded hosts or a subdomain of one.
    pub fn is_excluded(&self, domain: &str) -> bool {
        let domain = domain.trim_start_matches("www.");
        self.excluded_domains.iter().any(|excluded| {
            let excluded = excluded.trim().trim_start_matches("www.").to_lowercase();
            !excluded.is_empty()
                && (domain == excluded || domain.ends_with(&format!(".{}", excluded)))
        })
    }
}

// ============= Request / Outcome =============

/// What to search for. `queries` come from the upstream planner; when empty
/// the topic itself is used as the only query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub topic: String,
    #[serde(default)]
    pub report_type: String,
    #[serde(default)]
    pub queries: Vec<String>,
}

impl SearchRequest {
    pub fn new(topic: impl Into<String>, report_type: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            report_type: report_type.into(),
            queries: Vec::new(),
        }
    }

    pub fn with_queries<I, S>(mut self, queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queries = queries.into_iter().map(Into::into).collect();
        self
    }

    fn effective_queries(&self) -> Vec<String> {
        let queries: Vec<String> = self
            .queries
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect();
        if queries.is_empty() {
            vec![self.topic.trim().to_string()]
        } else {
            queries
        }
    }
}

/// Counters collected over one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchMetrics {
    pub steps_executed: usize,
    /// Calls issued per provider, including failed ones
    pub provider_calls: BTreeMap<String, usize>,
    pub failed_queries: usize,
    pub raw_results: usize,
    pub excluded: usize,
    pub invalid_urls: usize,
    pub duplicates: usize,
    pub evaluated: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Accepted sources later dropped by the general-media cap
    pub capped: usize,
    pub booster_used: bool,
    /// Steps or booster calls where every query failed
    pub outages: Vec<String>,
    pub enrichment_calls: usize,
    pub enrichment_successes: usize,
    pub latency_ms: u64,
}

impl SearchMetrics {
    fn count_call(&mut self, provider: &str) {
        *self.provider_calls.entry(provider.to_string()).or_default() += 1;
    }
}

/// Result of a search run. Below-target runs still carry every accepted
/// source.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub run_id: Uuid,
    pub topic: String,
    pub playbook: Playbook,
    /// Accepted sources, best total score first
    pub accepted: Vec<Source>,
    pub rejected_count: usize,
    pub target_met: bool,
    pub recommendation: Recommendation,
    pub quality_gate: QualityGate,
    pub metrics: SearchMetrics,
}

/// Recommendation implied by the accepted count alone.
pub fn target_recommendation(accepted: usize, target: usize) -> Recommendation {
    if accepted >= target {
        Recommendation::Proceed
    } else if accepted * 2 >= target {
        Recommendation::ProceedWithWarnings
    } else {
        Recommendation::RetrySearch
    }
}

// ============= Orchestrator =============

/// Hits of one step, in query order.
struct StepResult {
    provider: String,
    hits: Vec<(String, SearchHit)>,
    attempted: usize,
    failed: usize,
}

struct EnrichmentAttempt {
    canonical_url: String,
    content: Option<String>,
    calls: usize,
}

pub struct SearchOrchestrator {
    config: SearchConfig,
    policy: SearchPolicy,
    providers: ProviderRegistry,
    evaluator: Arc<SourceEvaluator>,
    retry: RetryPolicy,
    breakers: Arc<CircuitBreakers>,
    quality_gate: QualityGateConfig,
    clock: Arc<dyn Clock>,
}

impl SearchOrchestrator {
    pub fn new(
        config: SearchConfig,
        policy: SearchPolicy,
        providers: ProviderRegistry,
        evaluator: Arc<SourceEvaluator>,
        retry: RetryPolicy,
    ) -> Self {
        let breakers = Arc::new(CircuitBreakers::new(config.breaker_threshold));
        Self {
            config,
            policy,
            providers,
            evaluator,
            retry,
            breakers,
            quality_gate: QualityGateConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Share breakers across orchestrators so a disabled provider stays
    /// disabled process-wide.
    pub fn with_breakers(mut self, breakers: Arc<CircuitBreakers>) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn with_quality_gate(mut self, quality_gate: QualityGateConfig) -> Self {
        self.quality_gate = quality_gate;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &SearchPolicy {
        &self.policy
    }

    pub fn evaluator(&self) -> &Arc<SourceEvaluator> {
        &self.evaluator
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakers> {
        &self.breakers
    }

    /// Execute a full search run for `request`.
    pub async fn run(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        if request.topic.trim().is_empty() {
            return Err(AppError::InvalidInput("search topic is empty".to_string()));
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("search_run", run_id = %run_id, topic = %request.topic);
        self.execute(run_id, request).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, request: &SearchRequest) -> Result<SearchOutcome> {
        let started = Instant::now();
        let playbook = self
            .policy
            .select_playbook(&request.report_type, &request.topic);
        playbook.validate()?;

        let queries = request.effective_queries();
        info!(
            "Playbook {} selected (target {}, {} steps, {} queries available)",
            playbook.name,
            playbook.minimum_source_target,
            playbook.steps.len(),
            queries.len()
        );

        let mut metrics = SearchMetrics::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut accepted: Vec<Source> = Vec::new();
        let mut rejected_count = 0usize;

        for (index, step) in playbook.steps.iter().enumerate() {
            metrics.steps_executed += 1;
            let step_queries: Vec<String> =
                queries.iter().take(step.max_queries).cloned().collect();
            let label = format!("step {} ({})", index + 1, step.provider);
            info!(
                "Running {} with {} queries at {} depth",
                label,
                step_queries.len(),
                step.depth.as_str()
            );

            let result = self
                .search_step(
                    step.provider,
                    step.depth,
                    &step_queries,
                    step.results_per_query,
                    &mut metrics,
                )
                .await;
            if let Some(result) = result {
                self.record_outage(&label, &result, &mut metrics);
                let (kept, dropped) = self
                    .admit_and_evaluate(result, request, &playbook, &mut seen, &mut metrics)
                    .await;
                accepted.extend(kept);
                rejected_count += dropped;
                rejected_count += self.apply_caps(&mut accepted, &mut metrics);
            } else {
                metrics.outages.push(label.clone());
            }

            info!(
                "After {}: {} accepted of target {}",
                label,
                accepted.len(),
                playbook.minimum_source_target
            );
            if !self
                .policy
                .should_escalate(accepted.len(), index, &playbook)
            {
                break;
            }
        }

        if let Some(booster) = self.policy.booster_for(accepted.len(), &playbook) {
            let booster_queries: Vec<String> = queries.iter().take(1).cloned().collect();
            info!(
                "Below target ({} < {}), calling booster {}",
                accepted.len(),
                playbook.minimum_source_target,
                booster.provider
            );
            let result = self
                .search_step(
                    booster.provider,
                    SearchDepth::Advanced,
                    &booster_queries,
                    booster.results,
                    &mut metrics,
                )
                .await;
            let label = format!("booster ({})", booster.provider);
            if let Some(result) = result {
                metrics.booster_used = true;
                self.record_outage(&label, &result, &mut metrics);
                let (kept, dropped) = self
                    .admit_and_evaluate(result, request, &playbook, &mut seen, &mut metrics)
                    .await;
                accepted.extend(kept);
                rejected_count += dropped;
                rejected_count += self.apply_caps(&mut accepted, &mut metrics);
            } else {
                metrics.outages.push(label);
            }
        }

        if self.config.enrichment_enabled {
            self.enrich(&mut accepted, &playbook, &mut metrics).await;
        }

        accepted.sort_by(|a, b| {
            b.total_score()
                .partial_cmp(&a.total_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let target_met = accepted.len() >= playbook.minimum_source_target;
        let quality_gate = check_quality_gate(&accepted, &self.quality_gate);
        let recommendation = target_recommendation(accepted.len(), playbook.minimum_source_target);

        metrics.accepted = accepted.len();
        metrics.rejected = rejected_count;
        metrics.latency_ms = started.elapsed().as_millis() as u64;

        info!(
            "Search run finished: {} accepted, {} rejected, {} duplicates, target {} ({}), {}",
            metrics.accepted,
            metrics.rejected,
            metrics.duplicates,
            playbook.minimum_source_target,
            if target_met { "met" } else { "missed" },
            recommendation
        );
        for issue in &quality_gate.issues {
            warn!("Quality gate: {}", issue.message);
        }

        Ok(SearchOutcome {
            run_id,
            topic: request.topic.clone(),
            playbook,
            accepted,
            rejected_count,
            target_met,
            recommendation,
            quality_gate,
            metrics,
        })
    }

    fn record_outage(&self, label: &str, result: &StepResult, metrics: &mut SearchMetrics) {
        if result.attempted > 0 && result.failed == result.attempted {
            warn!(
                "Outage: every query of {} failed, continuing with the next step",
                label
            );
            metrics.outages.push(label.to_string());
        }
    }

    fn apply_caps(&self, accepted: &mut Vec<Source>, metrics: &mut SearchMetrics) -> usize {
        let dropped = self.evaluator.enforce_category_caps(accepted).len();
        metrics.capped += dropped;
        dropped
    }

    /// Dispatch `queries` to one provider. `None` when the provider is not
    /// configured or its breaker is open.
    async fn search_step(
        &self,
        kind: ProviderKind,
        depth: SearchDepth,
        queries: &[String],
        results_per_query: usize,
        metrics: &mut SearchMetrics,
    ) -> Option<StepResult> {
        let Some(provider) = self.providers.get(kind) else {
            warn!("Provider {} is not configured, skipping", kind);
            return None;
        };
        let name = provider.name().to_string();
        if self.breakers.is_open(&name) {
            warn!("Provider {} is disabled for this run, skipping", name);
            return None;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_queries.max(1)));
        type QueryOutcome = (usize, String, std::result::Result<Vec<SearchHit>, ProviderError>);
        let mut tasks: JoinSet<QueryOutcome> = JoinSet::new();

        for (index, query) in queries.iter().enumerate() {
            let permit = match Arc::clone(&semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tokio::time::sleep(self.config.dispatch_delay()).await;
                    match Arc::clone(&semaphore).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    }
                }
            };

            metrics.count_call(&name);
            let provider: Arc<dyn SearchProvider> = Arc::clone(&provider);
            let breakers = Arc::clone(&self.breakers);
            let retry = self.retry.clone();
            let query = query.clone();
            let name = name.clone();

            tasks.spawn(async move {
                let _permit = permit;
                if breakers.is_open(&name) {
                    let err = ProviderError::Disabled(name.clone());
                    return (index, query, Err(err));
                }
                let label = format!("{} search '{}'", name, query);
                let result = retry
                    .run(&label, || provider.search(&query, depth, results_per_query))
                    .await;
                match &result {
                    Ok(_) => breakers.record_success(&name),
                    Err(err) => breakers.record_provider_failure(&name, err),
                }
                (index, query, result)
            });
        }

        let mut completed = Vec::with_capacity(queries.len());
        let mut failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, query, Ok(hits))) => {
                    debug!("'{}' returned {} hits", query, hits.len());
                    completed.push((index, query, hits));
                }
                Ok((_, query, Err(err))) => {
                    failed += 1;
                    warn!("Query '{}' on {} abandoned: {}", query, name, err);
                }
                Err(err) => {
                    failed += 1;
                    warn!("Search task on {} panicked: {}", name, err);
                }
            }
        }
        metrics.failed_queries += failed;

        // Process in query order so the first query's hit wins a duplicate
        completed.sort_by_key(|(index, _, _)| *index);
        let hits: Vec<(String, SearchHit)> = completed
            .into_iter()
            .flat_map(|(_, query, hits)| {
                hits.into_iter()
                    .take(results_per_query)
                    .map(move |hit| (query.clone(), hit))
            })
            .collect();
        metrics.raw_results += hits.len();

        Some(StepResult {
            provider: name,
            hits,
            attempted: queries.len(),
            failed,
        })
    }

    /// Drop excluded and already-seen hits, then evaluate the rest.
    /// Returns the accepted sources and the number rejected.
    async fn admit_and_evaluate(
        &self,
        step: StepResult,
        request: &SearchRequest,
        playbook: &Playbook,
        seen: &mut HashSet<String>,
        metrics: &mut SearchMetrics,
    ) -> (Vec<Source>, usize) {
        let mut fresh = Vec::new();

        for (query, hit) in step.hits {
            let domain = extract_domain(&hit.url);
            if self.config.is_excluded(&domain) {
                metrics.excluded += 1;
                debug!("Excluded domain {} ({})", domain, hit.url);
                continue;
            }
            let canonical = canonicalize_url(&hit.url);
            if canonical.is_empty() {
                metrics.invalid_urls += 1;
                warn!("Skipping hit with unusable URL '{}'", hit.url);
                continue;
            }
            if !seen.insert(canonical.clone()) {
                metrics.duplicates += 1;
                continue;
            }

            fresh.push(self.source_from_hit(hit, canonical, domain, &step.provider, query));
        }

        if fresh.is_empty() {
            return (Vec::new(), 0);
        }
        metrics.evaluated += fresh.len();
        let (kept, rejected) = self
            .evaluator
            .evaluate_batch(fresh, &request.topic, playbook.is_critical)
            .await;
        (kept, rejected.len())
    }

    fn source_from_hit(
        &self,
        hit: SearchHit,
        canonical_url: String,
        domain: String,
        provider: &str,
        query: String,
    ) -> Source {
        let max_chars = self.config.max_chars_per_source;
        Source {
            canonical_url,
            title: hit.title,
            snippet: hit.snippet,
            content: hit
                .raw_content
                .filter(|c| !c.trim().is_empty())
                .map(|c| truncate_chars(&c, max_chars)),
            domain,
            provider: provider.to_string(),
            query,
            category: SourceCategory::default(),
            scores: None,
            fast_track: None,
            reasoning: None,
            enriched: false,
            discovered_at: self.clock.now(),
            url: hit.url,
        }
    }

    /// Fetch full content for the top enrichment candidates.
    async fn enrich(
        &self,
        accepted: &mut [Source],
        playbook: &Playbook,
        metrics: &mut SearchMetrics,
    ) {
        if self.providers.extractors().is_empty() || accepted.is_empty() {
            return;
        }

        let targets: Vec<(String, String)> = self
            .policy
            .select_enrichment_candidates(accepted, playbook)
            .into_iter()
            .map(|s| (s.canonical_url.clone(), s.url.clone()))
            .collect();
        if targets.is_empty() {
            return;
        }
        info!("Enriching {} sources", targets.len());

        let limit = self.config.max_concurrent_queries.max(1);
        let attempts: Vec<EnrichmentAttempt> = stream::iter(targets)
            .map(|(canonical_url, url)| self.enrich_one(canonical_url, url))
            .buffer_unordered(limit)
            .collect()
            .await;

        let max_chars = self.config.max_chars_per_source;
        for attempt in attempts {
            metrics.enrichment_calls += attempt.calls;
            let Some(content) = attempt.content else {
                continue;
            };
            if let Some(source) = accepted
                .iter_mut()
                .find(|s| s.canonical_url == attempt.canonical_url)
            {
                metrics.enrichment_successes += 1;
                source.content = Some(truncate_chars(&content, max_chars));
                source.enriched = true;
            }
        }
        info!(
            "Enrichment complete: {}/{} calls succeeded",
            metrics.enrichment_successes, metrics.enrichment_calls
        );
    }

    /// Walk the extractor chain until one returns content.
    async fn enrich_one(&self, canonical_url: String, url: String) -> EnrichmentAttempt {
        let mut calls = 0;
        for extractor in self.providers.extractors() {
            let name = extractor.name().to_string();
            if self.breakers.is_open(&name) {
                debug!("Extractor {} disabled, trying the next one", name);
                continue;
            }
            calls += 1;
            let label = format!("{} extract {}", name, url);
            match self.retry.run(&label, || extractor.extract(&url)).await {
                Ok(content) if !content.trim().is_empty() => {
                    self.breakers.record_success(&name);
                    return EnrichmentAttempt {
                        canonical_url,
                        content: Some(content),
                        calls,
                    };
                }
                Ok(_) => debug!("{} returned no content for {}", name, url),
                Err(err) => {
                    warn!("{} could not extract {}: {}", name, url, err);
                    self.breakers.record_extraction_failure(&name, &err);
                }
            }
        }
        EnrichmentAttempt {
            canonical_url,
            content: None,
            calls,
        }
    }
}
