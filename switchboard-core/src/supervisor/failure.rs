//! Structured terminal failures

use crate::protocol::TokenUsage;
use crate::providers::{FailureClass, ProviderError};
use serde::Serialize;
use serde_json::{json, Value};

/// What the client and the notification sink learn about a failed request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyFailure {
    pub classification: FailureClass,
    pub message: String,
    pub provider: Option<String>,
    pub model: String,
    pub partial_usage: Option<TokenUsage>,
    pub estimated_tokens: Option<u64>,
    pub max_context: Option<u64>,
    pub recommendations: Vec<String>,
    pub attempts: u32,

    #[serde(skip)]
    pub error: ProviderError,
}

impl ProxyFailure {
    pub fn new(error: ProviderError, model: impl Into<String>) -> Self {
        let (estimated_tokens, max_context) = match &error {
            ProviderError::ContextLimitExceeded {
                estimated_tokens,
                max_context,
                ..
            } => (*estimated_tokens, Some(*max_context)),
            _ => (None, None),
        };

        Self {
            classification: error.class(),
            message: error.to_string(),
            provider: None,
            model: model.into(),
            partial_usage: None,
            estimated_tokens,
            max_context,
            recommendations: recommendations_for(error.class()),
            attempts: 0,
            error,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_partial_usage(mut self, usage: TokenUsage) -> Self {
        self.partial_usage = Some(usage.into_partial());
        self
    }

    /// Fill in the context figures the error itself did not carry
    pub fn with_context_window(mut self, estimated_tokens: u64, max_context: u64) -> Self {
        self.estimated_tokens.get_or_insert(estimated_tokens);
        self.max_context.get_or_insert(max_context);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.error.status_code()
    }

    /// `{"error": {...}}` response body
    pub fn to_json_body(&self) -> Value {
        json!({ "error": self })
    }
}

impl std::fmt::Display for ProxyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.provider {
            Some(provider) => write!(f, "{} ({provider}): {}", self.classification, self.message),
            None => write!(f, "{}: {}", self.classification, self.message),
        }
    }
}

impl std::error::Error for ProxyFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Fixed remediation suggestions per class
pub fn recommendations_for(class: FailureClass) -> Vec<String> {
    let items: &[&str] = match class {
        FailureClass::ContextLimitExceeded => &[
            "Reduce the number or length of messages in the request",
            "Summarize or drop earlier conversation turns",
            "Lower max_tokens to leave room for the prompt",
            "Route the request to a model with a larger context window",
        ],
        FailureClass::ProviderHttpError => &[
            "Check the provider credentials and account status",
            "Verify the upstream model name is available to this account",
            "Retry later if the provider reported rate limiting or overload",
        ],
        FailureClass::TimeoutFailure | FailureClass::ConnectFailure => &[
            "Retry the request later",
            "Check network connectivity to the provider",
            "Increase the provider timeouts if responses are legitimately slow",
        ],
        FailureClass::ReadFailure | FailureClass::MalformedUpstreamBody => &[
            "Retry the request",
            "Report the provider response if the problem persists",
        ],
        FailureClass::UnknownModel => &["Use one of the configured model names"],
        FailureClass::ProviderDisabled => &["Enable the provider or route to another model"],
        FailureClass::CredentialUnavailable => {
            &["Set the credential referenced by the provider configuration"]
        }
        FailureClass::ClientCancelled => &[],
    };
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_limit_body() {
        let failure = ProxyFailure::new(
            ProviderError::ContextLimitExceeded {
                estimated_tokens: Some(300_000),
                max_context: 262_144,
                message: "estimated 300000 tokens".into(),
            },
            "kimi-for-coding",
        )
        .with_provider("moonshot")
        .with_attempts(0);

        assert_eq!(failure.status_code(), 413);
        let body = failure.to_json_body();
        assert_eq!(body["error"]["classification"], "context_limit_exceeded");
        assert_eq!(body["error"]["estimated_tokens"], 300_000);
        assert_eq!(body["error"]["max_context"], 262_144);
        assert_eq!(body["error"]["provider"], "moonshot");
        assert!(!body["error"]["recommendations"].as_array().unwrap().is_empty());
        assert!(body["error"].get("error").is_none());
    }

    #[test]
    fn test_context_window_does_not_override() {
        let failure = ProxyFailure::new(
            ProviderError::ContextLimitExceeded {
                estimated_tokens: Some(10),
                max_context: 20,
                message: String::new(),
            },
            "m",
        )
        .with_context_window(99, 99);
        assert_eq!(failure.estimated_tokens, Some(10));
        assert_eq!(failure.max_context, Some(20));
    }

    #[test]
    fn test_partial_usage_flagged() {
        let failure = ProxyFailure::new(ProviderError::read("reset"), "m")
            .with_partial_usage(TokenUsage::new(4, 2));
        assert!(failure.partial_usage.unwrap().partial);
        assert_eq!(failure.status_code(), 502);
    }
}
