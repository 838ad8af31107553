//! Firecrawl scrape client used for enrichment

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ContentExtractor, ExtractionError, ExtractionStatus, ProviderError};

pub const DEFAULT_FIRECRAWL_URL: &str = "https://api.firecrawl.dev";

pub struct FirecrawlClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl FirecrawlClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Markdown lives under `data.markdown` in v1 responses; older deployments
/// return it at the top level or as `content`.
fn markdown_from(body: &Value) -> Option<String> {
    [
        body.pointer("/data/markdown"),
        body.get("markdown"),
        body.get("content"),
    ]
    .into_iter()
    .flatten()
    .filter_map(|v| v.as_str())
    .find(|s| !s.trim().is_empty())
    .map(|s| s.to_string())
}

#[async_trait]
impl ContentExtractor for FirecrawlClient {
    fn name(&self) -> &str {
        "firecrawl"
    }

    async fn extract(&self, url: &str) -> Result<String, ExtractionError> {
        let body = json!({ "url": url, "formats": ["markdown"] });

        let response = self
            .http
            .post(format!("{}/v1/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &text).into());
        }

        let parsed: Value = response.json().await.map_err(|e| {
            ExtractionError::new(ExtractionStatus::HttpError, format!("invalid JSON: {}", e))
        })?;

        markdown_from(&parsed).ok_or_else(|| {
            ExtractionError::new(ExtractionStatus::HttpError, "response contained no markdown")
        })
    }
}
