//! Whole-document configuration validation

use super::error::{ValidationError, ValidationErrorKind};
use super::schema::GatewayConfig;
use regex::Regex;
use std::collections::HashSet;

/// Validates a parsed configuration beyond what serde enforces
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Refuse configs that declare no models
    require_models: bool,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also reject configs without any model entries
    pub fn require_models(mut self) -> Self {
        self.require_models = true;
        self
    }

    pub fn validate(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        config.validate()?;
        self.validate_provider_names(config)?;
        self.validate_models(config)?;
        self.validate_error_patterns(config)?;
        Ok(())
    }

    fn validate_provider_names(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for (i, provider) in config.providers.iter().enumerate() {
            if !seen.insert(provider.name.as_str()) {
                return Err(ValidationError::duplicate(
                    format!("providers[{i}].name"),
                    &provider.name,
                ));
            }
        }
        Ok(())
    }

    fn validate_models(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        if self.require_models && config.models.is_empty() {
            return Err(ValidationError::required("models"));
        }

        let providers: HashSet<&str> = config.providers.iter().map(|p| p.name.as_str()).collect();
        let mut seen = HashSet::new();

        for (i, model) in config.models.iter().enumerate() {
            if !seen.insert(model.name.as_str()) {
                return Err(ValidationError::duplicate(
                    format!("models[{i}].name"),
                    &model.name,
                ));
            }

            if !providers.contains(model.provider.as_str()) {
                return Err(ValidationError::new(
                    format!("models[{i}].provider"),
                    ValidationErrorKind::UnknownReference {
                        target: "provider".to_string(),
                        name: model.provider.clone(),
                    },
                ));
            }
        }
        Ok(())
    }

    fn validate_error_patterns(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        for (i, provider) in config.providers.iter().enumerate() {
            for (j, rule) in provider.error_patterns.iter().enumerate() {
                if let Err(e) = Regex::new(&rule.pattern) {
                    return Err(ValidationError::new(
                        format!("providers[{i}].error_patterns[{j}].pattern"),
                        ValidationErrorKind::InvalidPattern {
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }
        Ok(())
    }
}
