//! Tavily search client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{truncate_chars, ProviderError, SearchHit, SearchProvider};
use crate::search::canonical::title_from_url;
use crate::search::policy::{ProviderKind, SearchDepth};

pub const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com";

/// Upper bound Tavily accepts for `max_results`
const MAX_RESULTS_CAP: usize = 20;
const SNIPPET_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    raw_content: Option<String>,
}

pub struct TavilyClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tavily
    }

    async fn search(
        &self,
        query: &str,
        depth: SearchDepth,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let body = json!({
            "query": query,
            "search_depth": depth.as_str(),
            "max_results": max_results.clamp(1, MAX_RESULTS_CAP),
            "include_raw_content": true,
        });

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &text));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .filter(|r| !r.url.trim().is_empty())
            .map(|r| {
                let title = r
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| title_from_url(&r.url));
                let snippet = r
                    .content
                    .as_deref()
                    .or(r.raw_content.as_deref())
                    .unwrap_or_default();
                SearchHit {
                    title: title.trim().to_string(),
                    snippet: truncate_chars(snippet, SNIPPET_CHARS),
                    raw_content: r.raw_content.filter(|c| !c.trim().is_empty()),
                    url: r.url,
                }
            })
            .collect())
    }
}
