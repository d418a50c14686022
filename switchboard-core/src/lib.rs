//! Switchboard core library
//!
//! Routing, format translation and supervision for an LLM gateway that
//! exposes one OpenAI-style chat API over several upstream providers.
//!
//! - [`config`]: gateway configuration loading and validation
//! - [`providers`]: routing, wire formats and the failure taxonomy
//! - [`streaming`]: upstream SSE to client events
//! - [`supervisor`]: retries, classification and lifecycle notifications
//! - [`repair`]: best-effort repair of malformed tool-call JSON

pub mod config;
pub mod events;
pub mod http;
pub mod metrics;
pub mod protocol;
pub mod providers;
pub mod repair;
pub mod streaming;
pub mod supervisor;
pub mod tokens;

pub use config::{GatewayConfig, SecretString};
pub use events::{BroadcastSink, NotificationSink, ProxyEvent};
pub use http::{HttpClient, UpstreamTransport};
pub use metrics::{InMemoryMetrics, MetricsSink};
pub use protocol::{ChatRequest, ChatResponse, ChatStreamChunk, Message, TokenUsage};
pub use providers::{FailureClass, ProviderError, ProviderRegistry};
pub use repair::JsonRepairEngine;
pub use streaming::ClientEvent;
pub use supervisor::{ProxyFailure, SupervisedStream, Supervisor};

/// Returns the version of the Switchboard core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
