//! Request token estimation for the pre-flight context check

use crate::protocol::{ChatRequest, ContentPart, MessageContent};

/// Estimates how many prompt tokens a request will consume
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, request: &ChatRequest) -> u64;
}

/// Character-count heuristic: one token per `chars_per_token` characters of
/// message text, tool-call arguments and tool schemas, plus a small
/// per-message overhead
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: u64,
    per_message_overhead: u64,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            per_message_overhead: 4,
        }
    }
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: u64) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
            ..Default::default()
        }
    }

    fn count_chars(request: &ChatRequest) -> u64 {
        let mut chars = 0usize;

        for message in &request.messages {
            match &message.content {
                Some(MessageContent::Text(text)) => chars += text.chars().count(),
                Some(MessageContent::Parts(parts)) => {
                    for part in parts {
                        if let ContentPart::Text { text } = part {
                            chars += text.chars().count();
                        }
                    }
                }
                None => {}
            }

            for call in message.tool_calls.iter().flatten() {
                chars += call.function.name.len() + call.function.arguments.chars().count();
            }
        }

        for tool in request.tools.iter().flatten() {
            chars += tool.function.name.len();
            chars += tool
                .function
                .description
                .as_deref()
                .map_or(0, |d| d.chars().count());
            chars += tool
                .function
                .parameters
                .as_ref()
                .map_or(0, |p| p.to_string().len());
        }

        chars as u64
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, request: &ChatRequest) -> u64 {
        let chars = Self::count_chars(request);
        chars.div_ceil(self.chars_per_token)
            + self.per_message_overhead * request.messages.len() as u64
    }
}

/// Always reports the same count
#[derive(Debug, Clone, Copy)]
pub struct FixedEstimator(pub u64);

impl TokenEstimator for FixedEstimator {
    fn estimate(&self, _request: &ChatRequest) -> u64 {
        self.0
    }
}
