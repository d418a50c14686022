//! Request and response translation between the generic shape and each
//! provider's wire format

mod common;

use serde_json::json;
use switchboard_core::config::ProviderKind;
use switchboard_core::protocol::{
    ChatRequest, Message, MessageRole, TokenUsage, ToolCall, ToolDefinition,
};
use switchboard_core::providers::{
    from_upstream, from_upstream_event, to_upstream, GeminiFormat, ProviderRouter, StreamEvent,
};

fn router() -> ProviderRouter {
    ProviderRouter::new(common::registry())
}

fn weather_tool() -> ToolDefinition {
    ToolDefinition::function(
        "get_weather",
        Some("Current weather for a city".to_string()),
        Some(json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        })),
    )
}

fn tool_conversation(model: &str) -> ChatRequest {
    ChatRequest::new(
        model,
        vec![
            Message::system("You are terse."),
            Message::user("Weather in Paris?"),
            Message::assistant_tool_calls(vec![ToolCall::function(
                "call_1",
                "get_weather",
                r#"{"city":"Paris"}"#,
            )]),
            Message::tool("call_1", r#"{"temp_c": 18}"#),
        ],
    )
    .with_tools(vec![weather_tool()])
    .with_temperature(0.2)
    .with_max_tokens(256)
}

#[test]
fn test_openai_request_keeps_shape_and_substitutes_model() {
    let route = router().resolve("kimi-for-coding").unwrap();
    let result = to_upstream(&tool_conversation("kimi-for-coding"), &route);

    assert!(!result.is_lossy());
    assert_eq!(result.body["model"], "kimi-k2-0905-preview");
    assert_eq!(result.body["messages"].as_array().unwrap().len(), 4);
    assert_eq!(result.body["messages"][2]["tool_calls"][0]["id"], "call_1");
    assert_eq!(result.body["tools"][0]["function"]["name"], "get_weather");
    assert!(result.body.get("stream_options").is_none());
}

#[test]
fn test_gemini_request_translates_tool_conversation() {
    let route = router().resolve("gemini-flash").unwrap();
    let result = to_upstream(&tool_conversation("gemini-flash"), &route);
    let body = &result.body;

    assert!(body.get("model").is_none());
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are terse.");

    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["role"], "user");
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(
        contents[1]["parts"][0]["functionCall"],
        json!({"name": "get_weather", "args": {"city": "Paris"}})
    );
    assert_eq!(
        contents[2]["parts"][0]["functionResponse"],
        json!({"name": "get_weather", "response": {"temp_c": 18}})
    );

    assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    assert_eq!(
        body["tools"][0]["functionDeclarations"][0]["name"],
        "get_weather"
    );
}

#[test]
fn test_gemini_reports_fields_it_cannot_carry() {
    let route = router().resolve("gemini-flash").unwrap();
    let mut request = ChatRequest::new("gemini-flash", vec![Message::user("hi")]);
    request.user = Some("user-1234".to_string());

    let result = to_upstream(&request, &route);
    assert!(result.is_lossy());
    assert!(result.dropped.iter().any(|d| d.field == "user"));
}

#[test]
fn test_moonshot_choice_level_usage_normalized() {
    let body = json!({
        "id": "cmpl-1",
        "object": "chat.completion",
        "created": 1,
        "model": "kimi-k2-0905-preview",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "ok"},
            "finish_reason": "stop",
            "usage": {"prompt_tokens": 40, "completion_tokens": 2, "total_tokens": 42}
        }]
    });

    let response =
        from_upstream(body.to_string().as_bytes(), ProviderKind::OpenaiCompatible).unwrap();
    assert_eq!(response.usage, Some(TokenUsage::new(40, 2)));
}

#[test]
fn test_gemini_response_round_trips_through_native_shape() {
    let native = json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    {"text": "Checking."},
                    {"functionCall": {"id": "fc-1", "name": "get_weather", "args": {"city": "Oslo"}}}
                ]
            },
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {"promptTokenCount": 11, "candidatesTokenCount": 6, "totalTokenCount": 17},
        "modelVersion": "gemini-2.5-flash",
        "responseId": "resp-1"
    });

    let response = from_upstream(native.to_string().as_bytes(), ProviderKind::Gemini).unwrap();
    let choice = &response.choices[0];
    assert_eq!(choice.message.role, MessageRole::Assistant);
    assert_eq!(choice.message.text_content(), "Checking.");
    assert_eq!(choice.finish_reason.as_deref(), Some("tool_calls"));
    let call = &choice.message.tool_calls.as_ref().unwrap()[0];
    assert_eq!(call.id, "fc-1");

    let back = GeminiFormat::new().response_to_native(&response);
    let again = from_upstream(back.to_string().as_bytes(), ProviderKind::Gemini).unwrap();

    assert_eq!(again.id, response.id);
    assert_eq!(again.model, response.model);
    assert_eq!(again.choices, response.choices);
    assert_eq!(again.usage, response.usage);
}

#[test]
fn test_stream_event_dispatch_by_kind() {
    let openai = from_upstream_event(
        r#"{"choices":[{"index":0,"delta":{"content":"a"}}]}"#,
        ProviderKind::OpenaiCompatible,
    )
    .unwrap();
    assert!(matches!(openai, StreamEvent::Data(_)));

    let gemini = from_upstream_event(
        r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
        ProviderKind::Gemini,
    )
    .unwrap();
    match gemini {
        StreamEvent::ProviderError { status, message } => {
            assert_eq!(status, Some(429));
            assert!(message.contains("Resource exhausted"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}
