//! Gemini `generateContent` wire format
//!
//! Gemini nests content as `contents[].parts[]`, calls the assistant role
//! `model`, carries the system prompt out of band in `systemInstruction` and
//! delivers function calls whole, with already-parsed `args`. Streaming
//! (`alt=sse`) sends one complete `GenerateContentResponse` per event; the
//! event carrying a `finishReason` ends the stream.

use crate::config::ProviderKind;
use crate::protocol::{
    ChatRequest, ChatResponse, ChatStreamChunk, ContentPart, FunctionCallDelta, Message,
    MessageContent, MessageDelta, MessageRole, ResponseChoice, ResponseFormat, StreamChoice,
    TokenUsage, ToolCall, ToolCallDelta, ToolChoice, UsageFragment,
};
use crate::providers::adapter::{
    in_band_error, unix_now, DecodeError, DecodedEvent, StreamEvent, TransformResult, WireFormat,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Gemini wire format
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiFormat;

impl GeminiFormat {
    pub fn new() -> Self {
        Self
    }

    /// Generic response back to Gemini's native shape.
    ///
    /// Inverse of [`WireFormat::decode_response`] up to the locally stamped
    /// `created` timestamp and fields Gemini has no slot for.
    pub fn response_to_native(&self, response: &ChatResponse) -> Value {
        let candidates: Vec<Value> = response
            .choices
            .iter()
            .map(|choice| {
                let mut parts = Vec::new();
                let text = choice.message.text_content();
                if !text.is_empty() {
                    parts.push(json!({ "text": text }));
                }
                for call in choice.message.tool_calls.iter().flatten() {
                    parts.push(json!({
                        "functionCall": {
                            "id": call.id,
                            "name": call.function.name,
                            "args": parse_args(&call.function.arguments),
                        }
                    }));
                }

                let mut candidate = json!({
                    "content": { "role": "model", "parts": parts },
                    "index": choice.index,
                });
                if let Some(reason) = &choice.finish_reason {
                    candidate["finishReason"] = json!(finish_reason_to_native(reason));
                }
                candidate
            })
            .collect();

        let mut native = json!({
            "candidates": candidates,
            "modelVersion": response.model,
            "responseId": response.id,
        });
        if let Some(usage) = &response.usage {
            native["usageMetadata"] = json!({
                "promptTokenCount": usage.prompt_tokens,
                "candidatesTokenCount": usage.completion_tokens,
                "totalTokenCount": usage.total_tokens,
            });
        }
        native
    }

    fn encode_contents(
        &self,
        messages: &[Message],
        result: &mut TransformResult,
    ) -> (Vec<Value>, Vec<String>) {
        let mut system = Vec::new();
        let mut contents: Vec<(&'static str, Vec<Value>)> = Vec::new();
        let mut call_names: HashMap<&str, &str> = HashMap::new();

        for (i, message) in messages.iter().enumerate() {
            let (role, parts) = match message.role {
                MessageRole::System => {
                    let text = message.text_content();
                    if !text.is_empty() {
                        system.push(text);
                    }
                    continue;
                }
                MessageRole::User => ("user", self.content_parts(i, message, result)),
                MessageRole::Assistant => {
                    let mut parts = self.content_parts(i, message, result);
                    for call in message.tool_calls.iter().flatten() {
                        call_names.insert(call.id.as_str(), call.function.name.as_str());
                        parts.push(json!({
                            "functionCall": {
                                "name": call.function.name,
                                "args": parse_args(&call.function.arguments),
                            }
                        }));
                    }
                    ("model", parts)
                }
                MessageRole::Tool => {
                    let name = message
                        .tool_call_id
                        .as_deref()
                        .and_then(|id| call_names.get(id).copied())
                        .or(message.name.as_deref())
                        .or(message.tool_call_id.as_deref())
                        .unwrap_or("tool");
                    let text = message.text_content();
                    let response = match serde_json::from_str::<Value>(&text) {
                        Ok(value @ Value::Object(_)) => value,
                        _ => json!({ "content": text }),
                    };
                    (
                        "user",
                        vec![json!({
                            "functionResponse": { "name": name, "response": response }
                        })],
                    )
                }
            };

            if parts.is_empty() {
                continue;
            }

            // Gemini wants parallel function responses inside one turn
            match contents.last_mut() {
                Some((last_role, last_parts)) if *last_role == role => last_parts.extend(parts),
                _ => contents.push((role, parts)),
            }
        }

        let contents = contents
            .into_iter()
            .map(|(role, parts)| json!({ "role": role, "parts": parts }))
            .collect();
        (contents, system)
    }

    fn content_parts(
        &self,
        index: usize,
        message: &Message,
        result: &mut TransformResult,
    ) -> Vec<Value> {
        match &message.content {
            None => Vec::new(),
            Some(MessageContent::Text(text)) if text.is_empty() => Vec::new(),
            Some(MessageContent::Text(text)) => vec![json!({ "text": text })],
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .enumerate()
                .filter_map(|(j, part)| match part {
                    ContentPart::Text { text } => Some(json!({ "text": text })),
                    ContentPart::ImageUrl { image_url } => match split_data_url(&image_url.url) {
                        Some((mime_type, data)) => Some(json!({
                            "inlineData": { "mimeType": mime_type, "data": data }
                        })),
                        None => {
                            result.drop_field(
                                format!("messages[{index}].content[{j}].image_url"),
                                ProviderKind::Gemini,
                            );
                            None
                        }
                    },
                })
                .collect(),
        }
    }

    fn generation_config(&self, request: &ChatRequest, result: &mut TransformResult) -> Map<String, Value> {
        let mut config = Map::new();
        if let Some(v) = request.temperature {
            config.insert("temperature".into(), json!(v));
        }
        if let Some(v) = request.top_p {
            config.insert("topP".into(), json!(v));
        }
        if let Some(v) = request.max_tokens {
            config.insert("maxOutputTokens".into(), json!(v));
        }
        if let Some(stop) = &request.stop {
            config.insert("stopSequences".into(), json!(stop));
        }
        if let Some(v) = request.n {
            config.insert("candidateCount".into(), json!(v));
        }
        if let Some(v) = request.presence_penalty {
            config.insert("presencePenalty".into(), json!(v));
        }
        if let Some(v) = request.frequency_penalty {
            config.insert("frequencyPenalty".into(), json!(v));
        }
        if let Some(v) = request.seed {
            config.insert("seed".into(), json!(v));
        }
        match &request.response_format {
            Some(ResponseFormat::JsonObject) => {
                config.insert("responseMimeType".into(), json!("application/json"));
            }
            Some(ResponseFormat::JsonSchema { .. }) => {
                config.insert("responseMimeType".into(), json!("application/json"));
                result.drop_field("response_format.json_schema", ProviderKind::Gemini);
            }
            Some(ResponseFormat::Text) | None => {}
        }
        config
    }

    fn tools(&self, request: &ChatRequest, result: &mut TransformResult) -> Option<Value> {
        let tools = request.tools.as_ref()?;
        let mut declarations = Vec::new();
        for (i, tool) in tools.iter().enumerate() {
            if tool.tool_type != "function" {
                result.drop_field(format!("tools[{i}]"), ProviderKind::Gemini);
                continue;
            }
            let mut declaration = json!({ "name": tool.function.name });
            if let Some(description) = &tool.function.description {
                declaration["description"] = json!(description);
            }
            if let Some(parameters) = &tool.function.parameters {
                declaration["parameters"] = parameters.clone();
            }
            declarations.push(declaration);
        }
        (!declarations.is_empty()).then(|| json!([{ "functionDeclarations": declarations }]))
    }

    fn tool_config(&self, choice: &ToolChoice, result: &mut TransformResult) -> Option<Value> {
        let config = match choice {
            ToolChoice::Mode(mode) => match mode.as_str() {
                "auto" => json!({ "mode": "AUTO" }),
                "none" => json!({ "mode": "NONE" }),
                "required" => json!({ "mode": "ANY" }),
                _ => {
                    result.drop_field("tool_choice", ProviderKind::Gemini);
                    return None;
                }
            },
            ToolChoice::Function { function, .. } => json!({
                "mode": "ANY",
                "allowedFunctionNames": [function.name],
            }),
        };
        Some(json!({ "functionCallingConfig": config }))
    }
}

impl WireFormat for GeminiFormat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn encode_request(&self, request: &ChatRequest, _upstream_model: &str) -> TransformResult {
        // The model travels in the URL path
        let mut result = TransformResult::new(Value::Null);
        let (contents, system) = self.encode_contents(&request.messages, &mut result);

        let mut body = Map::new();
        body.insert("contents".into(), json!(contents));

        if !system.is_empty() {
            body.insert(
                "systemInstruction".into(),
                json!({ "parts": [{ "text": system.join("\n\n") }] }),
            );
        }

        let generation_config = self.generation_config(request, &mut result);
        if !generation_config.is_empty() {
            body.insert("generationConfig".into(), Value::Object(generation_config));
        }

        if let Some(tools) = self.tools(request, &mut result) {
            body.insert("tools".into(), tools);
        }
        if let Some(choice) = &request.tool_choice {
            if let Some(config) = self.tool_config(choice, &mut result) {
                body.insert("toolConfig".into(), config);
            }
        }

        if request.user.is_some() {
            result.drop_field("user", ProviderKind::Gemini);
        }
        if request.stream_options.is_some() {
            result.drop_field("stream_options", ProviderKind::Gemini);
        }
        for key in request.extra.keys() {
            result.drop_field(key.clone(), ProviderKind::Gemini);
        }

        result.body = Value::Object(body);
        result
    }

    fn decode_response(&self, body: &[u8]) -> Result<ChatResponse, DecodeError> {
        let value: Value = serde_json::from_slice(body)?;
        if let Some(StreamEvent::ProviderError { message, .. }) = in_band_error(&value) {
            return Err(DecodeError::UnexpectedShape(format!(
                "error object in successful response: {message}"
            )));
        }

        let native: NativeResponse = serde_json::from_value(value)?;
        if native.candidates.is_none() && native.prompt_feedback.is_none() {
            return Err(DecodeError::MissingField("candidates"));
        }

        let mut call_counter = 0usize;
        let choices = native
            .candidates
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(position, candidate)| {
                let index = candidate.index.unwrap_or(position as u32);
                let (text, calls) = split_parts(candidate.content);
                let tool_calls: Vec<ToolCall> = calls
                    .into_iter()
                    .map(|call| {
                        let id = call.id.unwrap_or_else(|| {
                            call_counter += 1;
                            format!("call_{call_counter}")
                        });
                        ToolCall::function(id, call.name, call.args.to_string())
                    })
                    .collect();

                let finish_reason = candidate
                    .finish_reason
                    .as_deref()
                    .map(|reason| finish_reason_from_native(reason, !tool_calls.is_empty()));

                let content = if text.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(MessageContent::Text(text))
                };

                ResponseChoice {
                    index,
                    message: Message {
                        role: MessageRole::Assistant,
                        content,
                        name: None,
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        tool_call_id: None,
                    },
                    finish_reason,
                    logprobs: None,
                }
            })
            .collect();

        Ok(ChatResponse {
            id: native.response_id.unwrap_or_else(generated_id),
            object: "chat.completion".to_string(),
            created: unix_now(),
            model: native.model_version.unwrap_or_default(),
            choices,
            usage: native
                .usage_metadata
                .as_ref()
                .map(|usage| TokenUsage::from(usage.fragment())),
            system_fingerprint: None,
        })
    }

    fn decode_event(&self, data: &str) -> Result<StreamEvent, DecodeError> {
        let value: Value = serde_json::from_str(data.trim())?;
        if let Some(error) = in_band_error(&value) {
            return Ok(error);
        }

        let native: NativeResponse = serde_json::from_value(value)?;
        let usage = native
            .usage_metadata
            .as_ref()
            .map(UsageMetadata::fragment)
            .filter(|fragment| !fragment.is_empty());

        let mut terminal = false;
        let mut choices = Vec::new();

        for (position, candidate) in native.candidates.unwrap_or_default().into_iter().enumerate() {
            let index = candidate.index.unwrap_or(position as u32);
            let (text, calls) = split_parts(candidate.content);
            let has_calls = !calls.is_empty();

            let tool_calls: Vec<ToolCallDelta> = calls
                .into_iter()
                .enumerate()
                .map(|(i, call)| ToolCallDelta {
                    index: i as u32,
                    id: Some(call.id.unwrap_or_else(generated_call_id)),
                    tool_type: Some("function".to_string()),
                    function: Some(FunctionCallDelta {
                        name: Some(call.name),
                        arguments: Some(call.args.to_string()),
                    }),
                })
                .collect();

            let finish_reason = candidate
                .finish_reason
                .as_deref()
                .map(|reason| finish_reason_from_native(reason, has_calls));
            terminal |= finish_reason.is_some();

            choices.push(StreamChoice {
                index,
                delta: MessageDelta {
                    role: Some(MessageRole::Assistant),
                    content: (!text.is_empty()).then_some(text),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                },
                finish_reason,
                logprobs: None,
            });
        }

        // A blocked prompt produces no candidates at all
        if choices.is_empty() && native.prompt_feedback.as_ref().is_some_and(|f| f.block_reason.is_some()) {
            terminal = true;
            choices.push(StreamChoice {
                index: 0,
                delta: MessageDelta::default(),
                finish_reason: Some("content_filter".to_string()),
                logprobs: None,
            });
        }

        let chunk = (!choices.is_empty()).then(|| ChatStreamChunk {
            id: native.response_id.clone().unwrap_or_default(),
            object: "chat.completion.chunk".to_string(),
            created: unix_now(),
            model: native.model_version.clone().unwrap_or_default(),
            choices,
            usage: None,
            system_fingerprint: None,
        });

        Ok(StreamEvent::Data(DecodedEvent {
            chunk,
            usage,
            terminal,
        }))
    }

    fn emits_whole_tool_calls(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    index: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    #[serde(default)]
    function_call: Option<NativeFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct NativeFunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default = "empty_args")]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
    #[serde(default)]
    thoughts_token_count: Option<u64>,
}

impl UsageMetadata {
    /// Thinking tokens are billed as output, so they count as completion
    fn fragment(&self) -> UsageFragment {
        let completion = match (self.candidates_token_count, self.thoughts_token_count) {
            (None, None) => None,
            (candidates, thoughts) => Some(candidates.unwrap_or(0) + thoughts.unwrap_or(0)),
        };
        let total = match (self.prompt_token_count, completion) {
            (None, None) => None,
            (prompt, completion) => Some(prompt.unwrap_or(0) + completion.unwrap_or(0)),
        };
        UsageFragment {
            prompt_tokens: self.prompt_token_count,
            completion_tokens: completion,
            total_tokens: total,
        }
    }
}

fn empty_args() -> Value {
    json!({})
}

/// Visible text and function calls of a candidate; thought parts are skipped
fn split_parts(content: Option<Content>) -> (String, Vec<NativeFunctionCall>) {
    let mut text = String::new();
    let mut calls = Vec::new();
    for part in content.unwrap_or_default().parts {
        if let Some(call) = part.function_call {
            calls.push(call);
        } else if let Some(fragment) = part.text {
            if part.thought != Some(true) {
                text.push_str(&fragment);
            }
        }
    }
    (text, calls)
}

fn finish_reason_from_native(reason: &str, has_tool_calls: bool) -> String {
    match reason {
        "STOP" if has_tool_calls => "tool_calls",
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => "content_filter",
        "MALFORMED_FUNCTION_CALL" => "tool_calls",
        other => return other.to_ascii_lowercase(),
    }
    .to_string()
}

fn finish_reason_to_native(reason: &str) -> String {
    match reason {
        "stop" | "tool_calls" => "STOP",
        "length" => "MAX_TOKENS",
        "content_filter" => "SAFETY",
        other => return other.to_ascii_uppercase(),
    }
    .to_string()
}

/// Function arguments as a JSON object; unparsable text is wrapped rather
/// than lost
fn parse_args(arguments: &str) -> Value {
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => json!({ "value": other }),
        Err(_) if arguments.trim().is_empty() => json!({}),
        Err(_) => json!({ "raw": arguments }),
    }
}

/// `data:<mime>;base64,<payload>` → (mime, payload)
fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((mime, data))
}

fn generated_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

fn generated_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ImageUrl, ToolDefinition};

    #[test]
    fn test_encode_roles_and_system_instruction() {
        let request = ChatRequest::new(
            "gemini-pro",
            vec![
                Message::system("Be terse."),
                Message::user("Weather in Paris?"),
                Message::assistant_tool_calls(vec![ToolCall::function(
                    "call_1",
                    "get_weather",
                    r#"{"city":"Paris"}"#,
                )]),
                Message::tool("call_1", r#"{"temp_c":18}"#),
            ],
        )
        .with_temperature(0.2)
        .with_max_tokens(256);

        let result = GeminiFormat.encode_request(&request, "gemini-2.5-pro");
        let body = &result.body;

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse.");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["functionCall"]["name"], "get_weather");
        assert_eq!(body["contents"][1]["parts"][0]["functionCall"]["args"]["city"], "Paris");
        assert_eq!(
            body["contents"][2]["parts"][0]["functionResponse"]["name"],
            "get_weather"
        );
        assert_eq!(
            body["contents"][2]["parts"][0]["functionResponse"]["response"]["temp_c"],
            18
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert!(body.get("model").is_none());
        assert!(!result.is_lossy());
    }

    #[test]
    fn test_encode_reports_dropped_fields() {
        let mut request = ChatRequest::new(
            "gemini-pro",
            vec![Message {
                role: MessageRole::User,
                content: Some(MessageContent::Parts(vec![
                    ContentPart::Text { text: "what is this?".into() },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "https://example.com/cat.png".into(),
                            detail: None,
                        },
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "data:image/png;base64,iVBORw0KGgo=".into(),
                            detail: None,
                        },
                    },
                ])),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            }],
        );
        request.user = Some("user-42".into());
        request.extra.insert("logit_bias".into(), json!({}));

        let result = GeminiFormat.encode_request(&request, "gemini-2.5-pro");
        let fields: Vec<&str> = result.dropped.iter().map(|d| d.field.as_str()).collect();

        assert_eq!(
            fields,
            vec!["messages[0].content[1].image_url", "user", "logit_bias"]
        );
        assert_eq!(
            result.body["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert!(result.body.get("user").is_none());
    }

    #[test]
    fn test_encode_tools_and_choice() {
        let mut request = ChatRequest::new("g", vec![Message::user("hi")]).with_tools(vec![
            ToolDefinition::function(
                "lookup",
                Some("Look something up".into()),
                Some(json!({"type": "object", "properties": {"q": {"type": "string"}}})),
            ),
        ]);
        request.tool_choice = Some(ToolChoice::Mode("required".into()));
        request.response_format = Some(ResponseFormat::JsonObject);

        let body = GeminiFormat.encode_request(&request, "g").body;
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "lookup");
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_decode_response_usage_and_finish_reason() {
        let body = br#"{
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Hello"},
                    {"text": " world"}
                ]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "thoughtsTokenCount": 7, "totalTokenCount": 22},
            "modelVersion": "gemini-2.5-pro",
            "responseId": "resp-1"
        }"#;

        let response = GeminiFormat.decode_response(body).unwrap();
        assert_eq!(response.id, "resp-1");
        assert_eq!(response.choices[0].message.text_content(), "Hello world");
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage, Some(TokenUsage::new(10, 12)));
    }

    #[test]
    fn test_decode_function_call_response() {
        let body = br#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"get_weather","args":{"city":"Oslo"}}}]},"finishReason":"STOP"}]}"#;

        let response = GeminiFormat.decode_response(body).unwrap();
        let message = &response.choices[0].message;
        let calls = message.tool_calls.as_ref().unwrap();

        assert!(message.content.is_none());
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.arguments, r#"{"city":"Oslo"}"#);
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_decode_response_requires_candidates() {
        let err = GeminiFormat.decode_response(br#"{"modelVersion":"x"}"#).unwrap_err();
        assert_eq!(err, DecodeError::MissingField("candidates"));
    }

    #[test]
    fn test_decode_stream_events() {
        let first = GeminiFormat
            .decode_event(r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}],"role":"model"}}],"usageMetadata":{"promptTokenCount":9,"candidatesTokenCount":1}}"#)
            .unwrap();
        let StreamEvent::Data(first) = first else {
            panic!("expected data event");
        };
        assert!(!first.terminal);
        assert_eq!(first.usage.unwrap().total_tokens, Some(10));
        assert_eq!(
            first.chunk.unwrap().choices[0].delta.content.as_deref(),
            Some("Hel")
        );

        let last = GeminiFormat
            .decode_event(r#"{"candidates":[{"content":{"parts":[{"text":"lo"}],"role":"model"},"finishReason":"MAX_TOKENS"}],"usageMetadata":{"promptTokenCount":9,"candidatesTokenCount":2}}"#)
            .unwrap();
        let StreamEvent::Data(last) = last else {
            panic!("expected data event");
        };
        assert!(last.terminal);
        assert_eq!(
            last.chunk.unwrap().choices[0].finish_reason.as_deref(),
            Some("length")
        );
    }

    #[test]
    fn test_decode_blocked_prompt_event() {
        let event = GeminiFormat
            .decode_event(r#"{"promptFeedback":{"blockReason":"SAFETY"},"usageMetadata":{"promptTokenCount":4}}"#)
            .unwrap();
        let StreamEvent::Data(event) = event else {
            panic!("expected data event");
        };
        assert!(event.terminal);
        assert_eq!(
            event.chunk.unwrap().choices[0].finish_reason.as_deref(),
            Some("content_filter")
        );
    }

    #[test]
    fn test_split_data_url() {
        assert_eq!(
            split_data_url("data:image/jpeg;base64,AAAA"),
            Some(("image/jpeg", "AAAA"))
        );
        assert_eq!(split_data_url("https://example.com/a.png"), None);
        assert_eq!(split_data_url("data:text/plain,hello"), None);
    }

    #[test]
    fn test_parse_args_wraps_non_objects() {
        assert_eq!(parse_args(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_args("[1,2]"), json!({"value": [1, 2]}));
        assert_eq!(parse_args(""), json!({}));
        assert_eq!(parse_args("{broken"), json!({"raw": "{broken"}));
    }
}
