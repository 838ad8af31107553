//! Provider client tests against mocked HTTP APIs
//!
//! Each client is pointed at a wiremock server and checked for the request
//! it sends, the hits it parses and the errors it maps.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use veritas::llm::openai::OpenAIClient;
use veritas::llm::LLMClient;
use veritas::providers::{
    ContentExtractor, ExaClient, ExtractionStatus, FirecrawlClient, ProviderError, SearchProvider,
    TavilyClient,
};
use veritas::quality::{EvaluationError, EvaluationModel, LlmJudge};
use veritas::retry::RetryPolicy;
use veritas::search::{ProviderKind, SearchDepth};
use veritas::types::{AppError, Source};

// ============= Helper Functions =============

fn chat_completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn verdict_json(score: f32) -> String {
    json!({
        "authenticity_score": score,
        "reliability_score": score,
        "relevance_score": score,
        "currency_score": score,
        "is_clickbait": false,
        "reasoning": "primary statistics"
    })
    .to_string()
}

fn sample_source() -> Source {
    Source::new(
        "https://www.iea.org/reports/batteries",
        "Batteries and secure energy transitions",
        "Battery storage capacity grew sharply",
        "tavily",
        "battery storage market size",
    )
}

fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        multiplier: 1.0,
        call_timeout: Duration::from_secs(5),
    }
}

// ============= Tavily =============

#[tokio::test]
async fn test_tavily_search_parses_hits() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("authorization", "Bearer tvly-test"))
        .and(body_partial_json(json!({
            "query": "battery storage",
            "search_depth": "advanced",
            "max_results": 8,
            "include_raw_content": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {
                    "url": "https://www.iea.org/reports/batteries",
                    "title": "Batteries report",
                    "content": "Capacity doubled",
                    "raw_content": "Full report text"
                },
                { "url": "https://example.com/energy-storage-outlook", "title": "", "content": "Outlook" },
                { "url": "", "title": "No URL" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TavilyClient::new("tvly-test", server.uri());
    assert_eq!(client.kind(), ProviderKind::Tavily);

    let hits = client
        .search("battery storage", SearchDepth::Advanced, 8)
        .await
        .expect("search succeeds");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].title, "Batteries report");
    assert_eq!(hits[0].snippet, "Capacity doubled");
    assert_eq!(hits[0].raw_content.as_deref(), Some("Full report text"));
    // Empty titles are synthesized from the URL
    assert_eq!(hits[1].title, "Energy Storage Outlook - Example");
    assert!(hits[1].raw_content.is_none());
}

#[tokio::test]
async fn test_tavily_caps_max_results() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "max_results": 20, "search_depth": "basic" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let hits = TavilyClient::new("k", server.uri())
        .search("q", SearchDepth::Basic, 50)
        .await
        .expect("search succeeds");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_tavily_status_mapping() {
    for status in [429u16, 402, 401, 500] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = TavilyClient::new("k", server.uri())
            .search("q", SearchDepth::Basic, 5)
            .await
            .expect_err("error status");
        let expected = match status {
            429 => matches!(err, ProviderError::RateLimited(_)),
            402 => matches!(err, ProviderError::CreditsExhausted(_)),
            401 => matches!(err, ProviderError::Auth(_)),
            _ => matches!(err, ProviderError::Http { status: 500, .. }),
        };
        assert!(expected, "status {} mapped to {:?}", status, err);
    }
}

#[tokio::test]
async fn test_tavily_rejects_non_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = TavilyClient::new("k", server.uri())
        .search("q", SearchDepth::Basic, 5)
        .await
        .expect_err("decode error");
    assert!(matches!(err, ProviderError::Decode(_)));
    assert!(!err.is_retryable());
}

// ============= Exa =============

#[tokio::test]
async fn test_exa_search_sends_key_and_text_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("x-api-key", "exa-test"))
        .and(body_partial_json(json!({
            "query": "solid state batteries",
            "numResults": 15,
            "type": "neural",
            "contents": { "text": { "maxCharacters": 500 } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "url": "https://nature.com/articles/x", "title": "Solid electrolytes", "text": "Long article body" },
                { "url": "https://b.org/y", "title": "No text" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ExaClient::new("exa-test", server.uri()).with_max_characters(500);
    assert_eq!(client.kind(), ProviderKind::Exa);

    let hits = client
        .search("solid state batteries", SearchDepth::Advanced, 15)
        .await
        .expect("search succeeds");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].raw_content.as_deref(), Some("Long article body"));
    assert_eq!(hits[0].snippet, "Long article body");
    assert!(hits[1].raw_content.is_none());
    assert!(hits[1].snippet.is_empty());
}

#[tokio::test]
async fn test_exa_basic_depth_uses_auto_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "type": "auto" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;

    ExaClient::new("k", server.uri())
        .search("q", SearchDepth::Basic, 5)
        .await
        .expect("search succeeds");
}

#[tokio::test]
async fn test_exa_credits_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(402).set_body_string("out of credits"))
        .mount(&server)
        .await;

    let err = ExaClient::new("k", server.uri())
        .search("q", SearchDepth::Basic, 5)
        .await
        .expect_err("402");
    assert_eq!(err, ProviderError::CreditsExhausted("out of credits".to_string()));
}

// ============= Firecrawl =============

#[tokio::test]
async fn test_firecrawl_extracts_markdown() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .and(header("authorization", "Bearer fc-test"))
        .and(body_partial_json(json!({
            "url": "https://iea.org/report",
            "formats": ["markdown"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "markdown": "# Report\n\nBody" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FirecrawlClient::new("fc-test", server.uri());
    assert_eq!(client.name(), "firecrawl");

    let markdown = client.extract("https://iea.org/report").await.expect("extracts");
    assert_eq!(markdown, "# Report\n\nBody");
}

#[tokio::test]
async fn test_firecrawl_error_statuses() {
    for (status, expected) in [
        (429u16, ExtractionStatus::RateLimited),
        (402, ExtractionStatus::CreditsExhausted),
        (404, ExtractionStatus::HttpError),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let err = FirecrawlClient::new("k", server.uri())
            .extract("https://a.org")
            .await
            .expect_err("error status");
        assert_eq!(err.status, expected, "status {}", status);
    }
}

#[tokio::test]
async fn test_firecrawl_empty_markdown_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": {} })),
        )
        .mount(&server)
        .await;

    let err = FirecrawlClient::new("k", server.uri())
        .extract("https://a.org")
        .await
        .expect_err("no markdown");
    assert_eq!(err.status, ExtractionStatus::HttpError);
}

#[tokio::test]
async fn test_firecrawl_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "markdown": "late" }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let err = FirecrawlClient::new("k", server.uri())
        .with_timeout(Duration::from_millis(50))
        .extract("https://a.org")
        .await
        .expect_err("times out");
    assert_eq!(err.status, ExtractionStatus::Timeout);
}

// ============= OpenAI-compatible chat =============

#[tokio::test]
async fn test_openai_client_sends_system_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                { "role": "system", "content": "be strict" },
                { "role": "user", "content": "rate this" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAIClient::new(
        "sk-test".to_string(),
        server.uri(),
        "gpt-4o-mini".to_string(),
    );
    assert_eq!(client.model_name(), "gpt-4o-mini");

    let reply = client
        .generate_with_system("be strict", "rate this")
        .await
        .expect("completion");
    assert_eq!(reply, "ok");
}

#[tokio::test]
async fn test_openai_client_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let client = OpenAIClient::new("k".to_string(), server.uri(), "m".to_string());
    let err = client.generate("hi").await.expect_err("401");
    match err {
        AppError::LLMStatus { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "bad key");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_openai_client_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_completion("late"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = OpenAIClient::new("k".to_string(), server.uri(), "m".to_string())
        .with_timeout(Duration::from_millis(50));
    let err = client.generate("hi").await.expect_err("timeout");
    assert!(matches!(err, AppError::LLMTimeout(_)), "{:?}", err);
}

#[tokio::test]
async fn test_openai_client_empty_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let client = OpenAIClient::new("k".to_string(), server.uri(), "m".to_string());
    assert!(client.generate("hi").await.is_err());
}

// ============= Judge over HTTP =============

#[tokio::test]
async fn test_judge_parses_fenced_verdict() {
    let server = MockServer::start().await;
    let reply = format!("Here is my assessment:\n```json\n{}\n```", verdict_json(8.0));

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion(&reply)))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(OpenAIClient::new("k".to_string(), server.uri(), "judge".to_string()));
    let judge = LlmJudge::new(client, quick_retry(1));
    assert_eq!(judge.label(), "judge");

    let verdict = judge
        .evaluate(&sample_source(), "battery storage")
        .await
        .expect("verdict");
    assert_eq!(verdict.relevance, 8.0);
    assert_eq!(verdict.reasoning, "primary statistics");
}

#[tokio::test]
async fn test_judge_retries_rate_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion(&verdict_json(7.0))))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(OpenAIClient::new("k".to_string(), server.uri(), "judge".to_string()));
    let judge = LlmJudge::new(client, quick_retry(3));

    let verdict = judge
        .evaluate(&sample_source(), "battery storage")
        .await
        .expect("second attempt succeeds");
    assert_eq!(verdict.authenticity, 7.0);
}

#[tokio::test]
async fn test_judge_does_not_retry_client_error_mentioning_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string("rate limit header 429 is malformed"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(OpenAIClient::new("k".to_string(), server.uri(), "judge".to_string()));
    let judge = LlmJudge::new(client, quick_retry(3));

    let err = judge
        .evaluate(&sample_source(), "battery storage")
        .await
        .expect_err("bad request");
    assert!(matches!(err, EvaluationError::Model(_)), "{:?}", err);
}

#[tokio::test]
async fn test_judge_does_not_retry_malformed_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_completion("I think it is fine.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(OpenAIClient::new("k".to_string(), server.uri(), "judge".to_string()));
    let judge = LlmJudge::new(client, quick_retry(3));

    let err = judge
        .evaluate(&sample_source(), "battery storage")
        .await
        .expect_err("malformed");
    assert!(matches!(err, EvaluationError::Malformed(_)));
}

#[cfg(feature = "ollama")]
#[tokio::test]
async fn test_judge_over_ollama() {
    use veritas::llm::ollama::OllamaClient;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "qwen2.5:7b",
            "created_at": "2026-01-01T00:00:00Z",
            "message": { "role": "assistant", "content": verdict_json(9.0) },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri(), "qwen2.5:7b".to_string())
        .await
        .expect("client");
    let judge = LlmJudge::new(Arc::new(client), quick_retry(1));

    let verdict = judge
        .evaluate(&sample_source(), "battery storage")
        .await
        .expect("verdict");
    assert_eq!(verdict.currency, 9.0);
}
