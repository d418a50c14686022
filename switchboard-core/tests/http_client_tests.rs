//! HTTP transport and end-to-end supervision against a mock upstream

use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::config::{ModelConfig, ProviderConfig, ProviderKind};
use switchboard_core::http::{
    collect_body, HttpClient, TransportError, UpstreamCall, UpstreamTarget, UpstreamTransport,
};
use switchboard_core::protocol::{ChatRequest, Message, TokenUsage};
use switchboard_core::providers::{FailureClass, ProviderRegistry, RetryPolicy, StaticCredentialStore};
use switchboard_core::streaming::ClientEvent;
use switchboard_core::Supervisor;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn call(server: &MockServer, route: &str, connect_timeout: Duration) -> UpstreamCall {
    let url = Url::parse(&format!("{}{route}", server.uri())).unwrap();
    UpstreamCall {
        request_id: Uuid::new_v4(),
        provider: "mock".to_string(),
        target: UpstreamTarget::new(url)
            .with_header("content-type", "application/json")
            .with_secret_header("authorization", "Bearer sk-mock"),
        body: Bytes::from_static(br#"{"model":"m"}"#),
        stream: false,
        connect_timeout,
    }
}

fn supervisor_for(server: &MockServer, kind: ProviderKind) -> Supervisor {
    let registry = ProviderRegistry::new(
        vec![ProviderConfig::new("mock", kind, format!("{}/v1", server.uri()), "MOCK_KEY")],
        vec![ModelConfig::new("mock-model", "mock").with_upstream_model("upstream-model")],
    );
    Supervisor::new(Arc::new(registry), Arc::new(HttpClient::new().unwrap()))
        .with_credentials(Arc::new(StaticCredentialStore::new().with_secret("MOCK_KEY", "sk-mock")))
        .with_retry_policy(RetryPolicy::new(2).with_delays(10, 10))
}

fn request() -> ChatRequest {
    ChatRequest::new("mock-model", vec![Message::user("ping")])
}

#[tokio::test]
async fn test_send_passes_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-mock"))
        .and(header("content-type", "application/json"))
        .and(header_exists("x-request-id"))
        .and(body_partial_json(serde_json::json!({"model": "m"})))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap();
    let response = assert_ok!(
        client
            .send(&call(&server, "/v1/chat/completions", Duration::from_secs(5)))
            .await
    );

    assert!(response.is_success());
    let body = collect_body(response.body, 1024).await.unwrap();
    assert_eq!(&body[..], br#"{"ok":true}"#);
}

#[tokio::test]
async fn test_error_status_is_returned_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap();
    let response = client
        .send(&call(&server, "/v1/chat/completions", Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(response.status, 429);
    let body = collect_body(response.body, 1024).await.unwrap();
    assert_eq!(&body[..], b"slow down");
}

#[tokio::test]
async fn test_slow_headers_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap();
    let err = assert_err!(
        client
            .send(&call(&server, "/slow", Duration::from_millis(50)))
            .await
    );

    assert_eq!(
        err,
        TransportError::Timeout {
            after: Duration::from_millis(50)
        }
    );
}

#[tokio::test]
async fn test_connection_refused() {
    let url = Url::parse("http://127.0.0.1:9/v1/chat/completions").unwrap();
    let call = UpstreamCall {
        request_id: Uuid::new_v4(),
        provider: "nowhere".to_string(),
        target: UpstreamTarget::new(url),
        body: Bytes::new(),
        stream: false,
        connect_timeout: Duration::from_secs(2),
    };

    let err = HttpClient::new().unwrap().send(&call).await.unwrap_err();
    assert!(matches!(err, TransportError::Connect { .. }));
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap();
    let response = client
        .send(&call(&server, "/big", Duration::from_secs(5)))
        .await
        .unwrap();

    let err = collect_body(response.body, 1024).await.unwrap_err();
    assert_eq!(err, TransportError::TooLarge { limit: 1024 });
}

#[tokio::test]
async fn test_supervisor_completion_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-mock"))
        .and(body_partial_json(serde_json::json!({"model": "upstream-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "upstream-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "pong"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = supervisor_for(&server, ProviderKind::OpenaiCompatible)
        .complete(&request())
        .await
        .unwrap();

    assert_eq!(response.choices[0].message.text_content(), "pong");
    assert_eq!(response.usage, Some(TokenUsage::new(3, 1)));
}

#[tokio::test]
async fn test_supervisor_maps_context_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {
                "message": "This model's maximum context length is 8192 tokens",
                "type": "invalid_request_error",
                "code": "context_length_exceeded"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let failure = supervisor_for(&server, ProviderKind::OpenaiCompatible)
        .complete(&request())
        .await
        .unwrap_err();

    assert_eq!(failure.classification, FailureClass::ContextLimitExceeded);
    assert_eq!(failure.status_code(), 413);
    assert_eq!(failure.attempts, 1);
}

#[tokio::test]
async fn test_gemini_stream_end_to_end() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"po\"}]},\"index\":0}]}\r\n\r\n",
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"ng\"}]},\"finishReason\":\"STOP\",\"index\":0}],",
        "\"usageMetadata\":{\"promptTokenCount\":2,\"candidatesTokenCount\":1,\"totalTokenCount\":3}}\r\n\r\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/models/upstream-model:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(query_param("key", "sk-mock"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stream = supervisor_for(&server, ProviderKind::Gemini)
        .stream(&request().with_streaming(), CancellationToken::new())
        .await
        .unwrap();
    let events: Vec<_> = stream.into_stream().collect().await;

    let text: String = events
        .iter()
        .filter_map(|e| match e {
            Ok(ClientEvent::Chunk(chunk)) => chunk.choices[0].delta.content.clone(),
            _ => None,
        })
        .collect();
    assert_eq!(text, "pong");
    assert!(matches!(events.last(), Some(Ok(ClientEvent::Done))));
}
