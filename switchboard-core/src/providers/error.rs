//! Failure taxonomy shared by routing, transport and supervision

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Classification of a terminal or retryable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    UnknownModel,
    ProviderDisabled,
    CredentialUnavailable,
    MalformedUpstreamBody,
    ConnectFailure,
    ReadFailure,
    TimeoutFailure,
    ContextLimitExceeded,
    ProviderHttpError,
    ClientCancelled,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::UnknownModel => "unknown_model",
            FailureClass::ProviderDisabled => "provider_disabled",
            FailureClass::CredentialUnavailable => "credential_unavailable",
            FailureClass::MalformedUpstreamBody => "malformed_upstream_body",
            FailureClass::ConnectFailure => "connect_failure",
            FailureClass::ReadFailure => "read_failure",
            FailureClass::TimeoutFailure => "timeout_failure",
            FailureClass::ContextLimitExceeded => "context_limit_exceeded",
            FailureClass::ProviderHttpError => "provider_http_error",
            FailureClass::ClientCancelled => "client_cancelled",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which wait ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPhase {
    Connect,
    FirstByte,
    Read,
    Request,
    /// Reported by the provider itself (408/504)
    Upstream,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            TimeoutPhase::Connect => "connect",
            TimeoutPhase::FirstByte => "first byte",
            TimeoutPhase::Read => "read",
            TimeoutPhase::Request => "request",
            TimeoutPhase::Upstream => "upstream",
        };
        f.write_str(phase)
    }
}

/// Errors raised while routing, calling or decoding an upstream provider
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("unknown model '{model}'")]
    UnknownModel { model: String },

    #[error("provider '{provider}' is disabled")]
    ProviderDisabled { provider: String },

    #[error("credential '{reference}' for provider '{provider}' could not be resolved")]
    CredentialUnavailable { provider: String, reference: String },

    #[error("malformed upstream body: {message}")]
    MalformedUpstreamBody { message: String },

    #[error("connection failed: {message}")]
    ConnectFailure { message: String },

    #[error("read failed: {message}")]
    ReadFailure { message: String },

    #[error("{}", describe_timeout(.phase, .after))]
    TimeoutFailure { phase: TimeoutPhase, after: Duration },

    #[error("context limit exceeded: {message}")]
    ContextLimitExceeded {
        estimated_tokens: Option<u64>,
        max_context: u64,
        message: String,
    },

    #[error("upstream returned {status}: {message}")]
    ProviderHttpError { status: u16, message: String },

    #[error("client cancelled the request")]
    ClientCancelled,
}

fn describe_timeout(phase: &TimeoutPhase, after: &Duration) -> String {
    if after.is_zero() {
        format!("{phase} timeout")
    } else {
        format!("{phase} timeout after {}ms", after.as_millis())
    }
}

impl ProviderError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::UnknownModel { .. } => FailureClass::UnknownModel,
            Self::ProviderDisabled { .. } => FailureClass::ProviderDisabled,
            Self::CredentialUnavailable { .. } => FailureClass::CredentialUnavailable,
            Self::MalformedUpstreamBody { .. } => FailureClass::MalformedUpstreamBody,
            Self::ConnectFailure { .. } => FailureClass::ConnectFailure,
            Self::ReadFailure { .. } => FailureClass::ReadFailure,
            Self::TimeoutFailure { .. } => FailureClass::TimeoutFailure,
            Self::ContextLimitExceeded { .. } => FailureClass::ContextLimitExceeded,
            Self::ProviderHttpError { .. } => FailureClass::ProviderHttpError,
            Self::ClientCancelled => FailureClass::ClientCancelled,
        }
    }

    /// Only failures that happen before the upstream produced any output are
    /// worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailure { .. } | Self::TimeoutFailure { .. }
        )
    }

    /// HTTP status reported to the client for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownModel { .. } => 404,
            Self::ProviderDisabled { .. } => 503,
            Self::CredentialUnavailable { .. } => 500,
            Self::MalformedUpstreamBody { .. }
            | Self::ConnectFailure { .. }
            | Self::ReadFailure { .. } => 502,
            Self::TimeoutFailure { .. } => 504,
            Self::ContextLimitExceeded { .. } => 413,
            Self::ProviderHttpError { status, .. } if (400..=599).contains(status) => *status,
            Self::ProviderHttpError { .. } => 502,
            Self::ClientCancelled => 499,
        }
    }

    pub fn timeout(phase: TimeoutPhase, after: Duration) -> Self {
        Self::TimeoutFailure { phase, after }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedUpstreamBody {
            message: message.into(),
        }
    }

    pub fn read(message: impl Into<String>) -> Self {
        Self::ReadFailure {
            message: message.into(),
        }
    }
}
