//! Evaluation models
//!
//! An [`EvaluationModel`] scores one source against a topic and returns a
//! [`ModelVerdict`]. The evaluator runs a cheap model first and escalates to
//! a stronger one for uncertain cases; both are usually an [`LlmJudge`]
//! wrapping an [`LLMClient`].
//!
//! Model replies are parsed against a strict schema: the four sub-scores are
//! required and must lie in `[0, 10]`. When the reply is not pure JSON, the
//! outermost `{...}` block is tried once. Anything else is
//! [`EvaluationError::Malformed`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::llm::LLMClient;
use crate::retry::{RetryPolicy, RetryableError};
use crate::types::{AppError, Source};

/// Errors from an evaluation model. Never propagated past the evaluator: a
/// failed evaluation rejects that one source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvaluationError {
    #[error("transient model error: {0}")]
    Transient(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed verdict: {0}")]
    Malformed(String),
}

impl RetryableError for EvaluationError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            EvaluationError::Transient(_) | EvaluationError::Timeout(_)
        )
    }

    fn timed_out(after: Duration) -> Self {
        EvaluationError::Timeout(after)
    }
}

/// HTTP statuses worth another attempt: rate limiting and upstream outages.
fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

impl From<AppError> for EvaluationError {
    fn from(err: AppError) -> Self {
        let transient = match &err {
            AppError::LLMStatus { status, .. } => is_transient_status(*status),
            AppError::LLMTimeout(_) => true,
            _ => false,
        };
        if transient {
            EvaluationError::Transient(err.to_string())
        } else {
            EvaluationError::Model(err.to_string())
        }
    }
}

/// Scores returned by a model for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVerdict {
    #[serde(alias = "authenticity_score")]
    pub authenticity: f32,
    #[serde(alias = "reliability_score")]
    pub reliability: f32,
    #[serde(alias = "relevance_score")]
    pub relevance: f32,
    #[serde(alias = "currency_score")]
    pub currency: f32,
    #[serde(default)]
    pub is_clickbait: bool,
    /// The model asks for a second opinion
    #[serde(default)]
    pub needs_detailed_review: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl ModelVerdict {
    fn validate(self) -> Result<Self, EvaluationError> {
        let fields = [
            ("authenticity", self.authenticity),
            ("reliability", self.reliability),
            ("relevance", self.relevance),
            ("currency", self.currency),
        ];
        for (name, value) in fields {
            if !value.is_finite() || !(0.0..=10.0).contains(&value) {
                return Err(EvaluationError::Malformed(format!(
                    "{} score {} outside [0, 10]",
                    name, value
                )));
            }
        }
        Ok(self)
    }
}

/// Parse a model reply into a verdict: strict JSON first, then the
/// outermost brace-delimited block.
pub fn parse_verdict(raw: &str) -> Result<ModelVerdict, EvaluationError> {
    let trimmed = raw.trim();
    let strict_error = match serde_json::from_str::<ModelVerdict>(trimmed) {
        Ok(verdict) => return verdict.validate(),
        Err(e) => e,
    };

    let block = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => {
            return Err(EvaluationError::Malformed(format!(
                "no JSON object in reply ({})",
                strict_error
            )))
        }
    };

    serde_json::from_str::<ModelVerdict>(block)
        .map_err(|e| EvaluationError::Malformed(e.to_string()))?
        .validate()
}

/// A model able to score a source for a topic.
#[async_trait]
pub trait EvaluationModel: Send + Sync {
    async fn evaluate(&self, source: &Source, topic: &str) -> Result<ModelVerdict, EvaluationError>;

    /// Short label for logs
    fn label(&self) -> String;
}

const JUDGE_SYSTEM_PROMPT: &str = r#"You are a senior source-quality analyst for due diligence research.
Score the candidate source on four criteria, each an integer from 0 to 10:

- authenticity: is the source genuine and verifiable (clear authorship and origin)?
- reliability: is the publisher a recognised, trustworthy institution or author?
- relevance: does it directly address the research topic?
- currency: is the information current (last 1-2 years scores 8-10)?

Flag sensationalist or misleading titles as clickbait.
Set needs_detailed_review to true when you are unsure.

Reply with ONLY this JSON object:
{
  "authenticity_score": <0-10>,
  "reliability_score": <0-10>,
  "relevance_score": <0-10>,
  "currency_score": <0-10>,
  "is_clickbait": <bool>,
  "needs_detailed_review": <bool>,
  "reasoning": "<one sentence>"
}"#;

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// Build the user prompt describing one candidate source.
pub fn judge_prompt(source: &Source, topic: &str) -> String {
    format!(
        "RESEARCH TOPIC: {}\n\nCANDIDATE SOURCE:\n- URL: {}\n- Title: {}\n- Domain: {}\n- Snippet: {}\n\nScore this source.",
        topic,
        source.url,
        source.title,
        source.domain,
        truncate_chars(&source.snippet, 300)
    )
}

/// [`EvaluationModel`] backed by any chat-capable [`LLMClient`].
pub struct LlmJudge {
    client: Arc<dyn LLMClient>,
    retry: RetryPolicy,
}

impl LlmJudge {
    pub fn new(client: Arc<dyn LLMClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl EvaluationModel for LlmJudge {
    async fn evaluate(
        &self,
        source: &Source,
        topic: &str,
    ) -> Result<ModelVerdict, EvaluationError> {
        let prompt = judge_prompt(source, topic);
        let label = format!("evaluate {} with {}", source.domain, self.client.model_name());

        let client = &self.client;
        let prompt = &prompt;
        let reply = self
            .retry
            .run(&label, || async move {
                client
                    .generate_with_system(JUDGE_SYSTEM_PROMPT, prompt)
                    .await
                    .map_err(EvaluationError::from)
            })
            .await?;

        parse_verdict(&reply)
    }

    fn label(&self) -> String {
        self.client.model_name().to_string()
    }
}
