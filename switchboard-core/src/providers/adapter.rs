//! Wire-format adapter trait
//!
//! A [`WireFormat`] converts between the generic chat-completion model and
//! one provider family's native JSON. Implementations are pure and
//! stateless: the same input always yields the same output, which keeps the
//! streaming pipeline free to call them per event.

use crate::config::ProviderKind;
use crate::protocol::{ChatRequest, ChatResponse, ChatStreamChunk, UsageFragment};
use crate::providers::error::ProviderError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure decoding an upstream body or event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("unexpected shape: {0}")]
    UnexpectedShape(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::InvalidJson(err.to_string())
    }
}

impl From<DecodeError> for ProviderError {
    fn from(err: DecodeError) -> Self {
        ProviderError::malformed(err.to_string())
    }
}

/// A request field the target provider cannot express. It is dropped, never
/// renamed or approximated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsupportedField {
    pub field: String,
    pub provider_kind: &'static str,
}

/// Encoded upstream body plus whatever had to be dropped to produce it
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub body: Value,
    pub dropped: Vec<UnsupportedField>,
}

impl TransformResult {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            dropped: Vec::new(),
        }
    }

    pub fn is_lossy(&self) -> bool {
        !self.dropped.is_empty()
    }

    pub(crate) fn drop_field(&mut self, field: impl Into<String>, kind: ProviderKind) {
        self.dropped.push(UnsupportedField {
            field: field.into(),
            provider_kind: kind.as_str(),
        });
    }
}

/// A decoded data event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedEvent {
    /// Client-facing chunk, absent for usage-only or empty events
    pub chunk: Option<ChatStreamChunk>,
    /// Usage counts carried by the event, already renamed
    pub usage: Option<UsageFragment>,
    /// The event ends the upstream stream
    pub terminal: bool,
}

/// One upstream stream event, decoded
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Data(DecodedEvent),
    /// Explicit end-of-stream sentinel
    Done,
    /// The provider reported an error in-band
    ProviderError { message: String, status: Option<u16> },
}

/// Conversion between the generic model and one provider family
pub trait WireFormat: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Generic request to native body; `upstream_model` replaces the
    /// client-facing model name
    fn encode_request(&self, request: &ChatRequest, upstream_model: &str) -> TransformResult;

    /// Native non-streaming response body to the generic response
    fn decode_response(&self, body: &[u8]) -> Result<ChatResponse, DecodeError>;

    /// One SSE `data:` payload to a stream event
    fn decode_event(&self, data: &str) -> Result<StreamEvent, DecodeError>;

    /// Whether tool calls arrive whole within a single event (rather than as
    /// argument fragments that only make sense once concatenated)
    fn emits_whole_tool_calls(&self) -> bool {
        false
    }
}

/// Read an `{"error": ...}` envelope out of a decoded event, if it is one
pub(crate) fn in_band_error(value: &Value) -> Option<StreamEvent> {
    let error = value.get("error")?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| error.as_str().map(str::to_string))
        .unwrap_or_else(|| error.to_string());
    let status = error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok());
    Some(StreamEvent::ProviderError { message, status })
}

/// Current unix time in seconds, for locally stamped `created` fields
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
