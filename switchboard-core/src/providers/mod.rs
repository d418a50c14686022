//! Provider routing, wire formats and failure classification
//!
//! A logical model name is resolved to a provider route, the generic request
//! is encoded into the provider's native shape, and responses and stream
//! events are decoded back. Errors from every stage share one taxonomy.

pub mod adapter;
pub mod classify;
pub mod credentials;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod registry;
pub mod retry;
pub mod routing;
pub mod transform;

pub use adapter::{DecodeError, DecodedEvent, StreamEvent, TransformResult, UnsupportedField, WireFormat};
pub use classify::{ClassificationRule, ErrorClassifier};
pub use credentials::{CredentialStore, EnvCredentialStore, StaticCredentialStore};
pub use error::{FailureClass, ProviderError, ProviderResult, TimeoutPhase};
pub use gemini::GeminiFormat;
pub use openai::OpenAiFormat;
pub use registry::ProviderRegistry;
pub use retry::RetryPolicy;
pub use routing::{ProviderRouter, Route};
pub use transform::{from_upstream, from_upstream_event, to_upstream, wire_format};
