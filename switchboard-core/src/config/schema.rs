//! Configuration schema for the gateway
//!
//! A [`GatewayConfig`] lists the upstream providers, the logical models
//! clients may ask for, and the tuning knobs of the retry supervisor, the
//! JSON repair breaker and the HTTP connection pool. Every struct rejects
//! unknown fields so a typo in a config file fails the load instead of
//! silently falling back to a default.

use super::error::{ValidationError, ValidationErrorKind};
use crate::protocol::UsageAccumulation;
use crate::providers::error::FailureClass;
use crate::providers::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SUPPORTED_VERSION: &str = "0.1";

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: String,

    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub models: Vec<ModelConfig>,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub repair: RepairConfig,

    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Wire-format family of an upstream provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI chat-completions shape
    OpenaiCompatible,
    /// Google Gemini `generateContent`
    Gemini,
    /// Hosted OpenAI-shaped endpoint authenticated with a custom header
    Managed,
}

impl ProviderKind {
    /// How streamed usage records of this family combine
    pub fn default_usage_accumulation(self) -> UsageAccumulation {
        match self {
            ProviderKind::OpenaiCompatible | ProviderKind::Gemini => UsageAccumulation::Replace,
            ProviderKind::Managed => UsageAccumulation::Add,
        }
    }

    pub fn default_auth(self) -> AuthScheme {
        match self {
            ProviderKind::OpenaiCompatible => AuthScheme::Bearer,
            ProviderKind::Gemini => AuthScheme::QueryParam {
                name: "key".to_string(),
            },
            ProviderKind::Managed => AuthScheme::Header {
                name: "x-api-key".to_string(),
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenaiCompatible => "openai_compatible",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Managed => "managed",
        }
    }
}

/// Where the resolved credential goes on the upstream request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `?<name>=<key>`
    QueryParam { name: String },
    /// `<name>: <key>`
    Header { name: String },
}

/// One upstream provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub name: String,

    pub kind: ProviderKind,

    pub base_url: String,

    /// Reference handed to the credential store, never the secret itself
    pub credential: String,

    /// Overrides the kind's default auth placement
    #[serde(default)]
    pub auth: Option<AuthScheme>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u64,

    /// Overrides the kind's default usage accumulation
    #[serde(default)]
    pub usage_accumulation: Option<UsageAccumulation>,

    /// Provider-specific classification rules, checked before the defaults
    #[serde(default)]
    pub error_patterns: Vec<ErrorPatternConfig>,
}

impl ProviderConfig {
    /// Convenience constructor with defaults for everything but identity
    pub fn new(
        name: impl Into<String>,
        kind: ProviderKind,
        base_url: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: base_url.into(),
            credential: credential.into(),
            auth: None,
            enabled: true,
            timeouts: TimeoutConfig::default(),
            max_context_tokens: default_max_context_tokens(),
            usage_accumulation: None,
            error_patterns: Vec::new(),
        }
    }

    pub fn with_max_context_tokens(mut self, tokens: u64) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_usage_accumulation(mut self, mode: UsageAccumulation) -> Self {
        self.usage_accumulation = Some(mode);
        self
    }

    pub fn with_error_pattern(
        mut self,
        pattern: impl Into<String>,
        classification: FailureClass,
    ) -> Self {
        self.error_patterns.push(ErrorPatternConfig {
            pattern: pattern.into(),
            classification,
        });
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        self.auth.clone().unwrap_or_else(|| self.kind.default_auth())
    }

    pub fn usage_mode(&self) -> UsageAccumulation {
        self.usage_accumulation
            .unwrap_or_else(|| self.kind.default_usage_accumulation())
    }

    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::required(format!("{path}.name")));
        }

        if self.credential.is_empty() {
            return Err(ValidationError::required(format!("{path}.credential")));
        }

        if self.base_url.is_empty() {
            return Err(ValidationError::required(format!("{path}.base_url")));
        }

        match url::Url::parse(&self.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(ValidationError::new(
                    format!("{path}.base_url"),
                    ValidationErrorKind::InvalidUrl {
                        message: format!("scheme must be http or https, got {}", url.scheme()),
                    },
                ));
            }
            Err(e) => {
                return Err(ValidationError::new(
                    format!("{path}.base_url"),
                    ValidationErrorKind::InvalidUrl {
                        message: e.to_string(),
                    },
                ));
            }
        }

        if self.max_context_tokens == 0 {
            return Err(ValidationError::out_of_range(
                format!("{path}.max_context_tokens"),
                "must be greater than 0",
            ));
        }

        match &self.auth {
            Some(AuthScheme::QueryParam { name }) | Some(AuthScheme::Header { name })
                if name.is_empty() =>
            {
                return Err(ValidationError::required(format!("{path}.auth.name")));
            }
            _ => {}
        }

        self.timeouts.validate(&format!("{path}.timeouts"))
    }
}

/// A provider-contributed classification rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorPatternConfig {
    /// Regular expression matched against the upstream error text
    pub pattern: String,
    pub classification: FailureClass,
}

/// Per-attempt timeouts, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Establishing the connection and receiving response headers
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,

    /// First body byte of a streaming response
    #[serde(default = "default_first_byte_ms")]
    pub first_byte_ms: u64,

    /// Gap between two body chunks
    #[serde(default = "default_read_ms")]
    pub read_ms: u64,

    /// Whole request, non-streaming calls only
    #[serde(default = "default_request_ms")]
    pub request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            first_byte_ms: default_first_byte_ms(),
            read_ms: default_read_ms(),
            request_ms: default_request_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn first_byte(&self) -> Duration {
        Duration::from_millis(self.first_byte_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    fn validate(&self, path: &str) -> Result<(), ValidationError> {
        for (field, value) in [
            ("connect_ms", self.connect_ms),
            ("first_byte_ms", self.first_byte_ms),
            ("read_ms", self.read_ms),
            ("request_ms", self.request_ms),
        ] {
            if value == 0 {
                return Err(ValidationError::out_of_range(
                    format!("{path}.{field}"),
                    "must be greater than 0",
                ));
            }
        }
        Ok(())
    }
}

/// A logical, client-facing model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub name: String,

    /// Name of the provider serving this model
    pub provider: String,

    /// Model identifier sent upstream; defaults to `name`
    #[serde(default)]
    pub upstream_model: Option<String>,

    /// Overrides the provider's context window
    #[serde(default)]
    pub max_context_tokens: Option<u64>,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            upstream_model: None,
            max_context_tokens: None,
        }
    }

    pub fn with_upstream_model(mut self, upstream: impl Into<String>) -> Self {
        self.upstream_model = Some(upstream.into());
        self
    }

    pub fn with_max_context_tokens(mut self, tokens: u64) -> Self {
        self.max_context_tokens = Some(tokens);
        self
    }

    pub fn upstream_name(&self) -> &str {
        self.upstream_model.as_deref().unwrap_or(&self.name)
    }

    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::required(format!("{path}.name")));
        }
        if self.provider.is_empty() {
            return Err(ValidationError::required(format!("{path}.provider")));
        }
        if matches!(self.upstream_model.as_deref(), Some("")) {
            return Err(ValidationError::required(format!("{path}.upstream_model")));
        }
        if self.max_context_tokens == Some(0) {
            return Err(ValidationError::out_of_range(
                format!("{path}.max_context_tokens"),
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Budget of the process-wide JSON repair circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepairConfig {
    /// Repairs admitted per window
    #[serde(default = "default_repair_attempts")]
    pub max_attempts_per_window: u32,

    /// Cumulative repair time admitted per window
    #[serde(default = "default_repair_time_ms")]
    pub max_time_per_window_ms: u64,

    #[serde(default = "default_repair_window_ms")]
    pub window_ms: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_window: default_repair_attempts(),
            max_time_per_window_ms: default_repair_time_ms(),
            window_ms: default_repair_window_ms(),
        }
    }
}

/// HTTP connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_keepalive")]
    pub keepalive_seconds: u64,

    /// Largest non-streaming response body accepted
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_max_idle(),
            keepalive_seconds: default_keepalive(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

fn default_enabled() -> bool { true }
fn default_max_context_tokens() -> u64 { 128_000 }
fn default_connect_ms() -> u64 { 10_000 }
fn default_first_byte_ms() -> u64 { 60_000 }
fn default_read_ms() -> u64 { 60_000 }
fn default_request_ms() -> u64 { 300_000 }
fn default_repair_attempts() -> u32 { 100 }
fn default_repair_time_ms() -> u64 { 1_000 }
fn default_repair_window_ms() -> u64 { 60_000 }
fn default_max_idle() -> usize { 10 }
fn default_keepalive() -> u64 { 90 }
fn default_max_response_bytes() -> usize { 10 * 1024 * 1024 }

impl GatewayConfig {
    /// Field-level checks; cross-references are left to `ConfigValidator`
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        if self.version != SUPPORTED_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: SUPPORTED_VERSION.to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        if self.providers.is_empty() {
            return Err(ValidationError::required("providers")
                .with_context("at least one provider must be configured"));
        }

        for (i, provider) in self.providers.iter().enumerate() {
            provider.validate(&format!("providers[{i}]"))?;
        }

        for (i, model) in self.models.iter().enumerate() {
            model.validate(&format!("models[{i}]"))?;
        }

        self.retry.validate("retry")?;

        if self.repair.window_ms == 0 {
            return Err(ValidationError::out_of_range(
                "repair.window_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}
