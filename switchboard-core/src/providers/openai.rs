//! OpenAI chat-completions wire format
//!
//! Used by both `openai_compatible` and `managed` providers. The generic
//! model already is this shape, so encoding substitutes the upstream model
//! and forces an in-stream usage record; decoding mostly normalizes usage,
//! which some compatible vendors (Moonshot among them) report inside
//! `choices[0]` instead of at the top level.

use crate::config::ProviderKind;
use crate::protocol::{ChatRequest, ChatResponse, ChatStreamChunk, TokenUsage, UsageFragment};
use crate::providers::adapter::{
    in_band_error, DecodeError, DecodedEvent, StreamEvent, TransformResult, WireFormat,
};
use serde_json::{json, Value};

const DONE_SENTINEL: &str = "[DONE]";

/// OpenAI-shaped wire format
#[derive(Debug, Clone, Copy)]
pub struct OpenAiFormat {
    kind: ProviderKind,
}

impl OpenAiFormat {
    pub const fn new(kind: ProviderKind) -> Self {
        Self { kind }
    }
}

impl Default for OpenAiFormat {
    fn default() -> Self {
        Self::new(ProviderKind::OpenaiCompatible)
    }
}

impl WireFormat for OpenAiFormat {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn encode_request(&self, request: &ChatRequest, upstream_model: &str) -> TransformResult {
        let mut body = json!(request);
        let mut dropped_stream_options = false;

        if let Some(obj) = body.as_object_mut() {
            obj.insert("model".into(), json!(upstream_model));

            if request.is_streaming() {
                let options = obj.entry("stream_options").or_insert_with(|| json!({}));
                if !options.is_object() {
                    *options = json!({});
                }
                options["include_usage"] = json!(true);
            } else {
                dropped_stream_options = obj.remove("stream_options").is_some();
            }
        }

        let mut result = TransformResult::new(body);
        if dropped_stream_options {
            result.drop_field("stream_options", self.kind);
        }
        result
    }

    fn decode_response(&self, body: &[u8]) -> Result<ChatResponse, DecodeError> {
        let mut value: Value = serde_json::from_slice(body)?;

        if let Some(StreamEvent::ProviderError { message, .. }) = in_band_error(&value) {
            return Err(DecodeError::UnexpectedShape(format!(
                "error object in successful response: {message}"
            )));
        }
        if value.get("choices").is_none() {
            return Err(DecodeError::MissingField("choices"));
        }

        let usage = take_usage(&mut value);
        let mut response: ChatResponse = serde_json::from_value(value)?;
        response.usage = usage.map(TokenUsage::from);
        if response.object.is_empty() {
            response.object = "chat.completion".to_string();
        }
        Ok(response)
    }

    fn decode_event(&self, data: &str) -> Result<StreamEvent, DecodeError> {
        let data = data.trim();
        if data == DONE_SENTINEL {
            return Ok(StreamEvent::Done);
        }

        let mut value: Value = serde_json::from_str(data)?;
        if let Some(error) = in_band_error(&value) {
            return Ok(error);
        }
        if !value.is_object() {
            return Err(DecodeError::UnexpectedShape(format!(
                "stream event is not an object: {data}"
            )));
        }

        let usage = take_usage(&mut value);
        let mut chunk: ChatStreamChunk = serde_json::from_value(value)?;
        if chunk.object.is_empty() {
            chunk.object = "chat.completion.chunk".to_string();
        }

        Ok(StreamEvent::Data(DecodedEvent {
            chunk: Some(chunk),
            usage,
            terminal: false,
        }))
    }
}

/// Remove every usage object from an OpenAI-shaped value and return the
/// normalized counts. Top-level `usage` wins over `choices[0].usage`.
pub(crate) fn take_usage(value: &mut Value) -> Option<UsageFragment> {
    let top_level = value
        .as_object_mut()
        .and_then(|obj| obj.remove("usage"))
        .and_then(|usage| fragment_from(&usage));

    let mut from_choice = None;
    if let Some(choices) = value.get_mut("choices").and_then(Value::as_array_mut) {
        for (i, choice) in choices.iter_mut().enumerate() {
            let removed = choice.as_object_mut().and_then(|obj| obj.remove("usage"));
            if i == 0 {
                from_choice = removed.and_then(|usage| fragment_from(&usage));
            }
        }
    }

    top_level.or(from_choice)
}

fn fragment_from(usage: &Value) -> Option<UsageFragment> {
    if !usage.is_object() {
        return None;
    }
    let fragment = UsageFragment {
        prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64),
        completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64),
        total_tokens: usage.get("total_tokens").and_then(Value::as_u64),
    };
    (!fragment.is_empty()).then_some(fragment)
}
