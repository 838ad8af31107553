//! Exa neural search client
//!
//! Exa returns page text alongside each hit, so results from this provider
//! usually skip enrichment.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{truncate_chars, ProviderError, SearchHit, SearchProvider};
use crate::search::canonical::title_from_url;
use crate::search::policy::{ProviderKind, SearchDepth};

pub const DEFAULT_EXA_URL: &str = "https://api.exa.ai";

const SNIPPET_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

pub struct ExaClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_characters: usize,
    timeout: Duration,
}

impl ExaClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_characters: 8000,
            timeout: Duration::from_secs(30),
        }
    }

    /// Cap on page text returned per hit.
    pub fn with_max_characters(mut self, max_characters: usize) -> Self {
        self.max_characters = max_characters;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SearchProvider for ExaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Exa
    }

    async fn search(
        &self,
        query: &str,
        depth: SearchDepth,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let search_type = match depth {
            SearchDepth::Basic => "auto",
            SearchDepth::Advanced => "neural",
        };
        let body = json!({
            "query": query,
            "numResults": max_results.max(1),
            "type": search_type,
            "contents": { "text": { "maxCharacters": self.max_characters } },
        });

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", &self.api_key)
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

        let parsed: ExaResponse = response
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
                let text = r.text.filter(|t| !t.trim().is_empty());
                SearchHit {
                    title: title.trim().to_string(),
                    snippet: text
                        .as_deref()
                        .map(|t| truncate_chars(t, SNIPPET_CHARS))
                        .unwrap_or_default(),
                    raw_content: text,
                    url: r.url,
                }
            })
            .collect())
    }
}
