//! Keyless search and page fetching powered by daedra
//!
//! DuckDuckGo needs no API key, which makes it the recall provider of last
//! resort. The page fetcher converts HTML to markdown and backs up Firecrawl
//! during enrichment.

use async_trait::async_trait;

use super::{
    ContentExtractor, ExtractionError, ExtractionStatus, ProviderError, SearchHit, SearchProvider,
};
use crate::search::canonical::title_from_url;
use crate::search::policy::{ProviderKind, SearchDepth};

/// Web search via DuckDuckGo
#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDuckGoProvider;

impl DuckDuckGoProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DuckDuckGo
    }

    async fn search(
        &self,
        query: &str,
        _depth: SearchDepth,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results: max_results.max(1),
                ..Default::default()
            }),
        };

        let response = daedra::tools::search::perform_search(&search_args)
            .await
            .map_err(|e| ProviderError::Transport(format!("DuckDuckGo search failed: {}", e)))?;

        Ok(response
            .data
            .iter()
            .filter(|r| !r.url.trim().is_empty())
            .take(max_results)
            .map(|r| SearchHit {
                url: r.url.clone(),
                title: if r.title.trim().is_empty() {
                    title_from_url(&r.url)
                } else {
                    r.title.trim().to_string()
                },
                snippet: r.description.clone(),
                raw_content: None,
            })
            .collect())
    }
}

/// Page fetching with HTML to markdown conversion
#[derive(Debug, Default, Clone, Copy)]
pub struct PageFetchExtractor;

impl PageFetchExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentExtractor for PageFetchExtractor {
    fn name(&self) -> &str {
        "page_fetch"
    }

    async fn extract(&self, url: &str) -> Result<String, ExtractionError> {
        let fetch_args = daedra::VisitPageArgs {
            url: url.to_string(),
            include_images: false,
            selector: None,
        };

        let page = daedra::tools::fetch::fetch_page(&fetch_args)
            .await
            .map_err(|e| {
                ExtractionError::new(
                    ExtractionStatus::HttpError,
                    format!("failed to fetch page: {}", e),
                )
            })?;

        if page.content.trim().is_empty() {
            return Err(ExtractionError::new(
                ExtractionStatus::HttpError,
                "page had no readable content",
            ));
        }
        Ok(page.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities() {
        assert_eq!(DuckDuckGoProvider::new().kind(), ProviderKind::DuckDuckGo);
        assert_eq!(DuckDuckGoProvider::new().name(), "duckduckgo");
        assert_eq!(PageFetchExtractor::new().name(), "page_fetch");
    }
}
