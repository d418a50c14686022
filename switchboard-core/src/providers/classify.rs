//! Data-driven classification of upstream error responses
//!
//! A non-2xx response is matched against an ordered list of rules; the
//! first rule whose provider, status and pattern all match decides the
//! class. Provider-specific rules from configuration come before the
//! built-in ones, and a response no rule claims is a plain
//! `ProviderHttpError`.

use crate::config::{ConfigError, ProviderConfig, ValidationError, ValidationErrorKind};
use crate::http::error::UpstreamErrorDetails;
use crate::providers::error::{FailureClass, ProviderError, TimeoutPhase};
use regex::Regex;
use std::time::Duration;

/// Phrases providers use when a prompt does not fit the context window
const CONTEXT_LIMIT_PATTERNS: &[&str] = &[
    r"context_length_exceeded",
    r"maximum context length",
    r"context (?:length|window)",
    r"too many tokens",
    r"prompt is too long",
    r"input token count.*exceeds",
    r"exceeds the maximum number of tokens",
    r"reduce the length of the messages",
    r"token limit",
];

/// One `(matcher, classification)` entry
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    provider: Option<String>,
    statuses: Vec<u16>,
    pattern: Option<Regex>,
    class: FailureClass,
}

impl ClassificationRule {
    pub fn new(class: FailureClass) -> Self {
        Self {
            provider: None,
            statuses: Vec::new(),
            pattern: None,
            class,
        }
    }

    /// Only apply to errors from this provider
    pub fn for_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Only apply to these statuses
    pub fn with_statuses(mut self, statuses: &[u16]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Only apply when the error text matches (case-insensitive)
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Some(Regex::new(&format!("(?i){pattern}"))?);
        Ok(self)
    }

    pub fn class(&self) -> FailureClass {
        self.class
    }

    fn matches(&self, provider: &str, status: u16, text: &str) -> bool {
        self.provider.as_deref().is_none_or(|p| p == provider)
            && (self.statuses.is_empty() || self.statuses.contains(&status))
            && self.pattern.as_ref().is_none_or(|re| re.is_match(text))
    }
}

/// Ordered rule list
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    rules: Vec<ClassificationRule>,
}

impl ErrorClassifier {
    /// A classifier with no rules; everything is a `ProviderHttpError`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in rules: upstream timeouts and context-limit phrasing
    pub fn with_defaults() -> Self {
        let mut classifier = Self::empty();
        classifier.push(
            ClassificationRule::new(FailureClass::TimeoutFailure).with_statuses(&[408, 504]),
        );
        for pattern in CONTEXT_LIMIT_PATTERNS {
            if let Ok(rule) =
                ClassificationRule::new(FailureClass::ContextLimitExceeded).with_pattern(pattern)
            {
                classifier.push(rule);
            }
        }
        classifier
    }

    /// Provider rules from configuration, then the built-in rules
    pub fn from_providers<'a>(
        providers: impl IntoIterator<Item = &'a ProviderConfig>,
    ) -> Result<Self, ConfigError> {
        let mut classifier = Self::empty();
        for (i, provider) in providers.into_iter().enumerate() {
            for (j, rule) in provider.error_patterns.iter().enumerate() {
                let compiled = ClassificationRule::new(rule.classification)
                    .for_provider(&provider.name)
                    .with_pattern(&rule.pattern)
                    .map_err(|e| {
                        ValidationError::new(
                            format!("providers[{i}].error_patterns[{j}].pattern"),
                            ValidationErrorKind::InvalidPattern {
                                message: e.to_string(),
                            },
                        )
                    })?;
                classifier.push(compiled);
            }
        }
        classifier.rules.extend(Self::with_defaults().rules);
        Ok(classifier)
    }

    pub fn push(&mut self, rule: ClassificationRule) {
        self.rules.push(rule);
    }

    /// Prepend a rule so it wins over everything already present
    pub fn prepend(&mut self, rule: ClassificationRule) {
        self.rules.insert(0, rule);
    }

    pub fn classify(&self, provider: &str, status: u16, text: &str) -> FailureClass {
        self.rules
            .iter()
            .find(|rule| rule.matches(provider, status, text))
            .map(ClassificationRule::class)
            .unwrap_or(FailureClass::ProviderHttpError)
    }

    /// Turn a non-2xx response into the matching error.
    ///
    /// `estimated_tokens` and `max_context` only feed a context-limit error.
    pub fn classify_error(
        &self,
        provider: &str,
        status: u16,
        details: &UpstreamErrorDetails,
        estimated_tokens: Option<u64>,
        max_context: u64,
    ) -> ProviderError {
        let text = details.describe();
        match self.classify(provider, status, &text) {
            FailureClass::ContextLimitExceeded => ProviderError::ContextLimitExceeded {
                estimated_tokens,
                max_context,
                message: text,
            },
            FailureClass::TimeoutFailure => {
                ProviderError::timeout(TimeoutPhase::Upstream, Duration::ZERO)
            }
            FailureClass::ConnectFailure => ProviderError::ConnectFailure { message: text },
            FailureClass::ReadFailure => ProviderError::ReadFailure { message: text },
            FailureClass::MalformedUpstreamBody => ProviderError::malformed(text),
            _ => ProviderError::ProviderHttpError {
                status,
                message: text,
            },
        }
    }
}
