//! Extraction of human-readable details from upstream error bodies

use serde_json::Value;

/// Longest raw body echoed back when no structured message is found
const MAX_RAW_ERROR_CHARS: usize = 2_000;

/// What an upstream said went wrong
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamErrorDetails {
    pub message: String,
    /// Machine-readable code or status (`context_length_exceeded`,
    /// `INVALID_ARGUMENT`, ...)
    pub code: Option<String>,
}

impl UpstreamErrorDetails {
    /// Message and code joined, the text classification rules run against
    pub fn describe(&self) -> String {
        match &self.code {
            Some(code) if !self.message.contains(code.as_str()) => {
                format!("{} ({code})", self.message)
            }
            _ => self.message.clone(),
        }
    }
}

/// Pull the error message out of a non-2xx response body
pub fn extract_error_details(status: u16, body: &[u8]) -> UpstreamErrorDetails {
    let text = String::from_utf8_lossy(body);

    if let Ok(json) = serde_json::from_str::<Value>(&text) {
        if let Some(details) = details_from_json(&json) {
            return details;
        }
    }

    let trimmed = text.trim();
    let message = if trimmed.is_empty() {
        format!("HTTP error {status}")
    } else {
        trimmed.chars().take(MAX_RAW_ERROR_CHARS).collect()
    };

    UpstreamErrorDetails {
        message,
        code: None,
    }
}

fn details_from_json(json: &Value) -> Option<UpstreamErrorDetails> {
    // Gemini occasionally wraps the error object in a one-element array
    if let Some(first) = json.as_array().and_then(|items| items.first()) {
        return details_from_json(first);
    }

    // OpenAI: {"error": {"message", "type", "code"}}
    // Gemini: {"error": {"code": 400, "message", "status": "INVALID_ARGUMENT"}}
    if let Some(error) = json.get("error") {
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .or_else(|| error.get("status").and_then(Value::as_str))
                .or_else(|| error.get("type").and_then(Value::as_str))
                .map(str::to_string);
            return Some(UpstreamErrorDetails {
                message: message.to_string(),
                code,
            });
        }

        if let Some(message) = error.as_str() {
            return Some(UpstreamErrorDetails {
                message: message.to_string(),
                code: None,
            });
        }
    }

    json.get("message")
        .and_then(Value::as_str)
        .map(|message| UpstreamErrorDetails {
            message: message.to_string(),
            code: json.get("code").and_then(Value::as_str).map(str::to_string),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_error_shape() {
        let body = br#"{"error":{"message":"This model's maximum context length is 8192 tokens","type":"invalid_request_error","code":"context_length_exceeded"}}"#;
        let details = extract_error_details(400, body);

        assert_eq!(details.code.as_deref(), Some("context_length_exceeded"));
        assert_eq!(
            details.describe(),
            "This model's maximum context length is 8192 tokens (context_length_exceeded)"
        );
    }

    #[test]
    fn test_gemini_error_shape() {
        let body = br#"[{"error":{"code":400,"message":"The input token count exceeds the maximum","status":"INVALID_ARGUMENT"}}]"#;
        let details = extract_error_details(400, body);

        assert_eq!(details.message, "The input token count exceeds the maximum");
        assert_eq!(details.code.as_deref(), Some("INVALID_ARGUMENT"));
    }

    #[test]
    fn test_plain_text_and_empty_bodies() {
        assert_eq!(
            extract_error_details(502, b"  Bad Gateway \n").message,
            "Bad Gateway"
        );
        assert_eq!(extract_error_details(503, b"").message, "HTTP error 503");
    }

    #[test]
    fn test_generic_message_shape() {
        let details = extract_error_details(500, br#"{"message":"upstream overloaded"}"#);
        assert_eq!(details.message, "upstream overloaded");
        assert_eq!(details.code, None);
    }
}
