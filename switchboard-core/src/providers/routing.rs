//! Provider and model selection
//!
//! Routing is a pure lookup: a logical model name resolves to its model and
//! provider configs, and a resolved route plus a credential yields the
//! upstream URL and headers. Nothing here touches the network, and routing
//! failures are terminal; they are never retried.

use crate::config::{AuthScheme, ModelConfig, ProviderConfig, ProviderKind, SecretString};
use crate::http::UpstreamTarget;
use crate::protocol::UsageAccumulation;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::registry::ProviderRegistry;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// A resolved provider/model pair
#[derive(Debug, Clone)]
pub struct Route {
    pub provider: Arc<ProviderConfig>,
    pub model: Arc<ModelConfig>,
}

impl Route {
    pub fn provider_name(&self) -> &str {
        &self.provider.name
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind
    }

    pub fn upstream_model(&self) -> &str {
        self.model.upstream_name()
    }

    /// Context window declared for the model, or its provider's
    pub fn max_context_tokens(&self) -> u64 {
        self.model
            .max_context_tokens
            .unwrap_or(self.provider.max_context_tokens)
    }

    pub fn usage_mode(&self) -> UsageAccumulation {
        self.provider.usage_mode()
    }
}

/// Stateless router over an immutable registry
#[derive(Debug, Clone)]
pub struct ProviderRouter {
    registry: Arc<ProviderRegistry>,
}

impl ProviderRouter {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve a client-facing model name
    pub fn resolve(&self, model: &str) -> ProviderResult<Route> {
        let model_config = self
            .registry
            .model(model)
            .ok_or_else(|| ProviderError::UnknownModel {
                model: model.to_string(),
            })?;

        let provider = self
            .registry
            .provider(&model_config.provider)
            .ok_or_else(|| ProviderError::UnknownModel {
                model: model.to_string(),
            })?;

        if !provider.enabled {
            return Err(ProviderError::ProviderDisabled {
                provider: provider.name.clone(),
            });
        }

        debug!(model, provider = %provider.name, upstream_model = model_config.upstream_name(), "resolved route");

        Ok(Route {
            provider: Arc::clone(provider),
            model: Arc::clone(model_config),
        })
    }

    /// Build the upstream URL and headers for one attempt
    pub fn target(
        &self,
        route: &Route,
        stream: bool,
        credential: &SecretString,
    ) -> ProviderResult<UpstreamTarget> {
        let mut url = Url::parse(&route.provider.base_url).map_err(|e| {
            ProviderError::ConnectFailure {
                message: format!("invalid base url for '{}': {e}", route.provider.name),
            }
        })?;

        {
            let mut segments = url.path_segments_mut().map_err(|_| ProviderError::ConnectFailure {
                message: format!("base url for '{}' cannot carry a path", route.provider.name),
            })?;
            segments.pop_if_empty();

            match route.kind() {
                ProviderKind::OpenaiCompatible | ProviderKind::Managed => {
                    segments.extend(["chat", "completions"]);
                }
                ProviderKind::Gemini => {
                    let method = if stream { "streamGenerateContent" } else { "generateContent" };
                    segments.push("models");
                    segments.push(&format!("{}:{method}", route.upstream_model()));
                }
            }
        }

        if stream && route.kind() == ProviderKind::Gemini {
            url.query_pairs_mut().append_pair("alt", "sse");
        }

        let mut target = UpstreamTarget::new(url).with_header("content-type", "application/json");
        if stream {
            target = target.with_header("accept", "text/event-stream");
        }

        let target = match route.provider.auth_scheme() {
            AuthScheme::Bearer => target.with_secret_header(
                "authorization",
                format!("Bearer {}", credential.expose_secret()),
            ),
            AuthScheme::Header { name } => {
                target.with_secret_header(name, credential.expose_secret())
            }
            AuthScheme::QueryParam { name } => {
                target.with_secret_query(name, credential.expose_secret())
            }
        };

        Ok(target)
    }
}
