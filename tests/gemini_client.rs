//! Integration tests for `GeminiClient`.
//!
//! Uses `wiremock` so no real provider traffic is made.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use listing_scout::llm::{GeminiClient, LanguageModel, LlmError};

const MODEL: &str = "gemini-test";
const ENDPOINT: &str = "/v1beta/models/gemini-test:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new(&server.uri(), MODEL, "test-key").expect("failed to build test client")
}

#[tokio::test]
async fn generate_joins_candidate_parts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"container_anuncio\": " }, { "text": "\".card\"}" }] }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server).generate("prompt").await.unwrap();
    assert_eq!(text, "{\"container_anuncio\": \".card\"}");
}

#[tokio::test]
async fn quota_errors_are_recognised() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "code": 429,
                "message": "You exceeded your current quota, please check your plan and billing details.",
                "status": "RESOURCE_EXHAUSTED"
            }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("prompt").await.unwrap_err();
    assert!(matches!(err, LlmError::Api { status: 429, .. }));
    assert!(err.is_quota_exceeded());
}

#[tokio::test]
async fn other_api_errors_are_not_quota() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("prompt").await.unwrap_err();
    assert!(!err.is_quota_exceeded());
    assert!(err.to_string().contains("API key not valid."));
}

#[tokio::test]
async fn empty_candidates_are_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("prompt").await.unwrap_err();
    assert!(matches!(err, LlmError::EmptyResponse(_)));
}
