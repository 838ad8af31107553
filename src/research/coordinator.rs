use crate::{
    llm::LLMClient,
    providers::ProviderRegistry,
    quality::{build_cache, EvaluationCache, EvaluationModel, LlmJudge, SourceEvaluator},
    references::{ChapterInput, ConsolidatedDocument, ReferenceConsolidator},
    retry::RetryPolicy,
    search::{SearchOrchestrator, SearchOutcome, SearchPolicy, SearchRequest},
    types::{AppError, Result},
    utils::{
        clock::{Clock, SystemClock},
        toml_config::{ModelConfig, VeritasConfig},
    },
};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Runs source acquisition for one or many topics and merges drafted
/// chapters into a single referenced document.
pub struct ResearchCoordinator {
    orchestrator: Arc<SearchOrchestrator>,
    consolidator: ReferenceConsolidator,
}

impl ResearchCoordinator {
    pub fn new(orchestrator: Arc<SearchOrchestrator>, consolidator: ReferenceConsolidator) -> Self {
        Self {
            orchestrator,
            consolidator,
        }
    }

    /// Wire providers, models and the evaluation cache from configuration.
    pub async fn from_config(config: &VeritasConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = build_cache(&config.cache, clock.clone());
        Self::from_config_with(config, cache, clock).await
    }

    pub async fn from_config_with(
        config: &VeritasConfig,
        cache: Arc<dyn EvaluationCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let retry = RetryPolicy::from_config(&config.retry);

        let cheap_config = config.models.cheap.as_ref().ok_or_else(|| {
            AppError::Config(
                "no [models.cheap] configured; the evaluator needs a model".to_string(),
            )
        })?;
        let cheap = judge_for(cheap_config, &retry).await?;

        let mut evaluator =
            SourceEvaluator::new(config.evaluator.clone(), cheap, cache, clock.clone())
                .with_cache_ttl(config.cache.ttl());
        if let Some(strong_config) = &config.models.strong {
            evaluator = evaluator.with_strong(judge_for(strong_config, &retry).await?);
        }

        let providers = ProviderRegistry::from_config(config)?;
        let orchestrator = SearchOrchestrator::new(
            config.search.clone(),
            SearchPolicy::new(config.policy.clone()),
            providers,
            Arc::new(evaluator),
            retry,
        )
        .with_quality_gate(config.quality_gate.clone())
        .with_clock(clock);

        Ok(Self::new(
            Arc::new(orchestrator),
            ReferenceConsolidator::new(config.references.style),
        ))
    }

    pub fn orchestrator(&self) -> &Arc<SearchOrchestrator> {
        &self.orchestrator
    }

    pub fn consolidator(&self) -> &ReferenceConsolidator {
        &self.consolidator
    }

    /// Acquire and evaluate sources for one topic
    pub async fn gather(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        self.orchestrator.run(request).await
    }

    /// Run several topics concurrently. Each topic still executes its steps
    /// in order, and one topic failing does not affect the others. Results
    /// come back in request order.
    pub async fn gather_many(
        &self,
        requests: Vec<SearchRequest>,
    ) -> Vec<(String, Result<SearchOutcome>)> {
        let mut set = JoinSet::new();
        let topics: Vec<String> = requests.iter().map(|r| r.topic.clone()).collect();

        for (index, request) in requests.into_iter().enumerate() {
            let orchestrator = Arc::clone(&self.orchestrator);
            set.spawn(async move { (index, orchestrator.run(&request).await) });
        }

        let mut slots: Vec<Option<Result<SearchOutcome>>> = topics.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => tracing::error!("Topic task failed to complete: {}", e),
            }
        }

        topics
            .into_iter()
            .zip(slots)
            .map(|(topic, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    Err(AppError::Internal(format!("search for '{}' was aborted", topic)))
                });
                (topic, outcome)
            })
            .collect()
    }

    /// Merge drafted chapters into one document with a global reference list
    pub fn consolidate(&self, chapters: &[ChapterInput]) -> ConsolidatedDocument {
        self.consolidator.consolidate(chapters)
    }
}

async fn judge_for(config: &ModelConfig, retry: &RetryPolicy) -> Result<Arc<dyn EvaluationModel>> {
    let provider = config.to_provider()?;
    provider.ensure_available()?;
    let client: Arc<dyn LLMClient> = provider.create_client().await?;
    tracing::info!("Evaluation model ready: {} ({})", client.model_name(), provider.name());
    Ok(Arc::new(LlmJudge::new(client, retry.clone())))
}
