//! Format transformation entry points
//!
//! Picks the wire format for a provider kind and runs the conversion,
//! logging any request fields the target could not express. Dropped fields
//! are reported alongside the body and never fail the request.

use crate::config::ProviderKind;
use crate::protocol::{ChatRequest, ChatResponse};
use crate::providers::adapter::{DecodeError, StreamEvent, TransformResult, WireFormat};
use crate::providers::gemini::GeminiFormat;
use crate::providers::openai::OpenAiFormat;
use crate::providers::routing::Route;
use tracing::warn;

static OPENAI_COMPATIBLE: OpenAiFormat = OpenAiFormat::new(ProviderKind::OpenaiCompatible);
static MANAGED: OpenAiFormat = OpenAiFormat::new(ProviderKind::Managed);
static GEMINI: GeminiFormat = GeminiFormat;

/// The wire format spoken by a provider kind
pub fn wire_format(kind: ProviderKind) -> &'static dyn WireFormat {
    match kind {
        ProviderKind::OpenaiCompatible => &OPENAI_COMPATIBLE,
        ProviderKind::Managed => &MANAGED,
        ProviderKind::Gemini => &GEMINI,
    }
}

/// Generic request to the routed provider's native body
pub fn to_upstream(request: &ChatRequest, route: &Route) -> TransformResult {
    let result = wire_format(route.kind()).encode_request(request, route.upstream_model());

    if result.is_lossy() {
        let fields: Vec<&str> = result.dropped.iter().map(|d| d.field.as_str()).collect();
        warn!(
            provider = %route.provider_name(),
            dropped = ?fields,
            "request fields unsupported by provider were dropped"
        );
    }

    result
}

/// Native non-streaming body to the generic response
pub fn from_upstream(body: &[u8], kind: ProviderKind) -> Result<ChatResponse, DecodeError> {
    wire_format(kind).decode_response(body)
}

/// One native stream event to a generic event
pub fn from_upstream_event(data: &str, kind: ProviderKind) -> Result<StreamEvent, DecodeError> {
    wire_format(kind).decode_event(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_kind() {
        assert_eq!(wire_format(ProviderKind::Gemini).kind(), ProviderKind::Gemini);
        assert_eq!(wire_format(ProviderKind::Managed).kind(), ProviderKind::Managed);
        assert!(wire_format(ProviderKind::Gemini).emits_whole_tool_calls());
        assert!(!wire_format(ProviderKind::OpenaiCompatible).emits_whole_tool_calls());
    }

    #[test]
    fn test_from_upstream_event_done_is_openai_only() {
        assert_eq!(
            from_upstream_event("[DONE]", ProviderKind::Managed).unwrap(),
            StreamEvent::Done
        );
        assert!(from_upstream_event("[DONE]", ProviderKind::Gemini).is_err());
    }
}
