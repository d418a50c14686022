//! Read-only registry of providers and logical models

use crate::config::{GatewayConfig, ModelConfig, ProviderConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable lookup tables built once from configuration.
///
/// Cloning is cheap; every entry sits behind an `Arc` and is shared by all
/// in-flight requests.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<ProviderConfig>>,
    models: HashMap<String, Arc<ModelConfig>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderConfig>, models: Vec<ModelConfig>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|p| (p.name.clone(), Arc::new(p)))
                .collect(),
            models: models
                .into_iter()
                .map(|m| (m.name.clone(), Arc::new(m)))
                .collect(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.providers.clone(), config.models.clone())
    }

    pub fn provider(&self, name: &str) -> Option<&Arc<ProviderConfig>> {
        self.providers.get(name)
    }

    pub fn model(&self, name: &str) -> Option<&Arc<ModelConfig>> {
        self.models.get(name)
    }

    pub fn providers(&self) -> impl Iterator<Item = &Arc<ProviderConfig>> {
        self.providers.values()
    }

    /// Logical model names, sorted
    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    #[test]
    fn test_lookup() {
        let registry = ProviderRegistry::new(
            vec![ProviderConfig::new(
                "openai",
                ProviderKind::OpenaiCompatible,
                "https://api.openai.com/v1",
                "OPENAI_API_KEY",
            )],
            vec![
                ModelConfig::new("gpt-4o", "openai"),
                ModelConfig::new("gpt-4o-mini", "openai"),
            ],
        );

        assert!(registry.provider("openai").is_some());
        assert!(registry.provider("anthropic").is_none());
        assert_eq!(registry.model("gpt-4o").unwrap().provider, "openai");
        assert_eq!(registry.model_names(), vec!["gpt-4o", "gpt-4o-mini"]);
    }
}
