//! Mock implementations for testing.
//!
//! Scripted search providers, a counting evaluation model and a canned
//! content extractor, shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use veritas::providers::{
    ContentExtractor, ExtractionError, ProviderError, ProviderRegistry, SearchHit, SearchProvider,
};
use veritas::quality::{
    EvaluationCache, EvaluationError, EvaluationModel, EvaluatorConfig, InMemoryEvaluationCache,
    ModelVerdict, SourceEvaluator,
};
use veritas::retry::RetryPolicy;
use veritas::search::{
    PolicyConfig, ProviderKind, SearchConfig, SearchDepth, SearchOrchestrator, SearchPolicy,
};
use veritas::types::Source;
use veritas::utils::clock::ManualClock;

/// Build a hit with a descriptive title and snippet.
pub fn hit(url: &str, title: &str) -> SearchHit {
    SearchHit {
        url: url.to_string(),
        title: title.to_string(),
        snippet: format!("{} with market size and growth figures", title),
        raw_content: None,
    }
}

/// Search provider returning scripted hits per query.
///
/// Queries without a script get the default hits. Every call is recorded.
pub struct ScriptedProvider {
    kind: ProviderKind,
    by_query: HashMap<String, Vec<SearchHit>>,
    by_depth: Vec<(SearchDepth, Vec<SearchHit>)>,
    default_hits: Vec<SearchHit>,
    failure: Option<ProviderError>,
    calls: Mutex<Vec<(String, SearchDepth, usize)>>,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            by_query: HashMap::new(),
            by_depth: Vec::new(),
            default_hits: Vec::new(),
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default(mut self, hits: Vec<SearchHit>) -> Self {
        self.default_hits = hits;
        self
    }

    pub fn with_query(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.by_query.insert(query.to_string(), hits);
        self
    }

    /// Hits for every query searched at `depth`. Query scripts win.
    pub fn with_depth(mut self, depth: SearchDepth, hits: Vec<SearchHit>) -> Self {
        self.by_depth.push((depth, hits));
        self
    }

    pub fn failing(mut self, err: ProviderError) -> Self {
        self.failure = Some(err);
        self
    }

    pub fn calls(&self) -> Vec<(String, SearchDepth, usize)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl SearchProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn search(
        &self,
        query: &str,
        depth: SearchDepth,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        self.calls.lock().push((query.to_string(), depth, max_results));
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let hits = self
            .by_query
            .get(query)
            .or_else(|| {
                self.by_depth
                    .iter()
                    .find(|(d, _)| *d == depth)
                    .map(|(_, hits)| hits)
            })
            .unwrap_or(&self.default_hits);
        Ok(hits.iter().take(max_results).cloned().collect())
    }
}

/// Search provider that holds every call for `latency` and records the
/// highest number of calls in flight at once.
pub struct GaugedProvider {
    kind: ProviderKind,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl GaugedProvider {
    pub fn new(kind: ProviderKind, latency: Duration) -> Self {
        Self {
            kind,
            latency,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for GaugedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn search(
        &self,
        _query: &str,
        _depth: SearchDepth,
        _max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// Evaluation model returning one verdict and counting its calls.
pub struct CountingModel {
    verdict: Option<ModelVerdict>,
    calls: AtomicUsize,
    label: String,
}

impl CountingModel {
    /// Scores every criterion with `score`.
    pub fn scoring(score: f32) -> Self {
        Self {
            verdict: Some(ModelVerdict {
                authenticity: score,
                reliability: score,
                relevance: score,
                currency: score,
                is_clickbait: false,
                needs_detailed_review: false,
                reasoning: format!("scored {}", score),
            }),
            calls: AtomicUsize::new(0),
            label: format!("counting-{}", score),
        }
    }

    /// Always fails with a malformed reply.
    pub fn broken() -> Self {
        Self {
            verdict: None,
            calls: AtomicUsize::new(0),
            label: "broken".to_string(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvaluationModel for CountingModel {
    async fn evaluate(
        &self,
        _source: &Source,
        _topic: &str,
    ) -> Result<ModelVerdict, EvaluationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict
            .clone()
            .ok_or_else(|| EvaluationError::Malformed("not JSON".to_string()))
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

/// Extractor returning fixed markdown for every URL.
pub struct CannedExtractor {
    name: String,
    content: Result<String, ExtractionError>,
    calls: AtomicUsize,
}

impl CannedExtractor {
    pub fn returning(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            content: Ok(content.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str, err: ExtractionError) -> Self {
        Self {
            name: name.to_string(),
            content: Err(err),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentExtractor for CannedExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, _url: &str) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.content.clone()
    }
}

pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(),
    ))
}

/// Search settings with no dispatch delay and enrichment off.
pub fn quiet_search_config() -> SearchConfig {
    SearchConfig {
        dispatch_delay_ms: 0,
        enrichment_enabled: false,
        ..SearchConfig::default()
    }
}

/// Everything an orchestrator test needs to inspect after a run.
pub struct Harness {
    pub orchestrator: SearchOrchestrator,
    pub cache: Arc<InMemoryEvaluationCache>,
}

pub fn harness(
    registry: ProviderRegistry,
    model: Arc<dyn EvaluationModel>,
    policy: PolicyConfig,
    search: SearchConfig,
) -> Harness {
    let clock = test_clock();
    let cache = Arc::new(InMemoryEvaluationCache::new(clock.clone()));
    let shared: Arc<dyn EvaluationCache> = cache.clone();
    let evaluator = SourceEvaluator::new(EvaluatorConfig::default(), model, shared, clock.clone());
    let orchestrator = SearchOrchestrator::new(
        search,
        SearchPolicy::new(policy),
        registry,
        Arc::new(evaluator),
        RetryPolicy::no_retry(Duration::from_secs(5)),
    )
    .with_clock(clock);
    Harness { orchestrator, cache }
}
