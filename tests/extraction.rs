//! End-to-end extraction tests against mocked provider endpoints.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cardscan::dispatch::Dispatcher;
use cardscan::providers::{
    ErrorTag, GeminiProvider, MistralProvider, NvidiaProvider, VisionProvider,
};

/// Minimal JPEG-ish fixture on disk; providers only read bytes, the model
/// call is mocked.
fn card_image(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("card.jpg");
    std::fs::write(&path, b"\xFF\xD8\xFF\xE0 not a real jpeg").unwrap();
    path
}

fn openai_style_body(content: &str, tokens: u64) -> serde_json::Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 100, "completion_tokens": 50, "total_tokens": tokens}
    })
}

#[tokio::test]
async fn nvidia_extracts_and_normalizes_fenced_json() {
    let server = MockServer::start().await;
    let content = "Here is the card data:\n```json\n{\"name\": \"Jane Roe\", \
                   \"company\": \"Acme Pvt Ltd\", \"phoneNumbers\": [\"Mob: +919876543210\"], \
                   \"address\": \"12 MG Road, Bengaluru Ph: 080 1234 5678 ,\"}\n```";

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_style_body(content, 512)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let provider = NvidiaProvider::new(reqwest::Client::new(), Some("test-key".to_string()))
        .with_base_url(server.uri());

    let record = provider.extract(&card_image(&dir)).await.unwrap();
    assert_eq!(record.name.as_deref(), Some("Jane Roe"));
    assert_eq!(record.company.as_deref(), Some("Acme Pvt Ltd"));
    assert_eq!(record.model, "nvidia");
    assert_eq!(record.tokens, Some(512));
    assert_eq!(record.phone_numbers, vec!["+91 98765 43210".to_string()]);
    assert_eq!(record.address.as_deref(), Some("12 MG Road, Bengaluru"));
}

#[tokio::test]
async fn nvidia_classifies_forbidden_as_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let provider = NvidiaProvider::new(reqwest::Client::new(), Some("bad-key".to_string()))
        .with_base_url(server.uri());

    let err = provider.extract(&card_image(&dir)).await.unwrap_err();
    assert_eq!(err.tag(), Some(ErrorTag::AuthFailed));
}

#[tokio::test]
async fn mistral_extracts_plain_json() {
    let server = MockServer::start().await;
    let content = "{\"name\": \"Jane Roe\", \"email\": \"jane@acme.example\"}";

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_style_body(content, 0)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let provider = MistralProvider::new(reqwest::Client::new(), Some("test-key".to_string()))
        .with_base_url(server.uri());

    let record = provider.extract(&card_image(&dir)).await.unwrap();
    assert_eq!(record.name.as_deref(), Some("Jane Roe"));
    assert_eq!(record.email.as_deref(), Some("jane@acme.example"));
    assert_eq!(record.model, "mistral");
}

#[tokio::test]
async fn gemini_classifies_rate_limit_as_quota() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let provider = GeminiProvider::new(reqwest::Client::new(), Some("test-key".to_string()))
        .with_base_url(server.uri());

    let err = provider.extract(&card_image(&dir)).await.unwrap_err();
    assert_eq!(err.tag(), Some(ErrorTag::QuotaExceeded));
}

#[tokio::test]
async fn gemini_reads_candidate_text_and_token_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "{\"name\": \"Jane Roe\"}"}]}}],
            "usageMetadata": {"totalTokenCount": 321}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let provider = GeminiProvider::new(reqwest::Client::new(), Some("test-key".to_string()))
        .with_base_url(server.uri());

    let record = provider.extract(&card_image(&dir)).await.unwrap();
    assert_eq!(record.name.as_deref(), Some("Jane Roe"));
    assert_eq!(record.tokens, Some(321));
    assert_eq!(record.model, "gemini");
}

#[tokio::test]
async fn dispatcher_falls_back_after_auth_failure() {
    let failing = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&failing)
        .await;

    let succeeding = MockServer::start().await;
    let content = "{\"name\": \"Jane Roe\"}";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_style_body(content, 10)))
        .mount(&succeeding)
        .await;

    let client = reqwest::Client::new();
    let dispatcher = Dispatcher::new(vec![
        Arc::new(
            NvidiaProvider::new(client.clone(), Some("bad-key".to_string()))
                .with_base_url(failing.uri()),
        ) as Arc<dyn VisionProvider>,
        Arc::new(
            MistralProvider::new(client, Some("good-key".to_string()))
                .with_base_url(succeeding.uri()),
        ),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let result = dispatcher.extract_one(&card_image(&dir), "auto").await;
    assert!(result.is_success());
    assert_eq!(result.provider, "mistral");
}

#[tokio::test]
async fn dispatcher_reports_auth_tag_when_all_keys_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let dispatcher = Dispatcher::new(vec![
        Arc::new(
            NvidiaProvider::new(client.clone(), Some("bad-key".to_string()))
                .with_base_url(server.uri()),
        ) as Arc<dyn VisionProvider>,
        Arc::new(
            MistralProvider::new(client, Some("bad-key".to_string()))
                .with_base_url(server.uri()),
        ),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let result = dispatcher.extract_one(&card_image(&dir), "auto").await;
    assert!(!result.is_success());
    assert_eq!(result.provider, "auth_failed");
}

#[tokio::test]
async fn unconfigured_providers_are_dropped_from_the_chain() {
    let client = reqwest::Client::new();
    let dispatcher = Dispatcher::new(vec![
        Arc::new(NvidiaProvider::new(client.clone(), None)) as Arc<dyn VisionProvider>,
        Arc::new(GeminiProvider::new(client, None)),
    ]);

    assert!(!dispatcher.has_providers());

    let dir = tempfile::tempdir().unwrap();
    let result = dispatcher.extract_one(&card_image(&dir), "auto").await;
    assert!(!result.is_success());
    assert_eq!(result.provider, "failed");
}
