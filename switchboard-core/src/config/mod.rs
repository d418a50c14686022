//! Configuration loading
//!
//! Provider and model definitions are read once at startup from YAML or
//! JSON, with `${VAR}` references substituted from the environment before
//! parsing. The parsed document is validated in full before it is handed to
//! the provider registry, which never changes afterwards.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::{interpolate_env_vars, referenced_vars};
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    AuthScheme, ConnectionConfig, ErrorPatternConfig, GatewayConfig, ModelConfig, ProviderConfig,
    ProviderKind, RepairConfig, TimeoutConfig, SUPPORTED_VERSION,
};
pub use secrets::SecretString;
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;
use tracing::debug;

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<GatewayConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_yaml(&content, &path.to_string_lossy())
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<GatewayConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_json(&content, &path.to_string_lossy())
}

/// Parse YAML text; `origin` only labels errors
pub fn parse_yaml(content: &str, origin: &str) -> ConfigResult<GatewayConfig> {
    let interpolated = interpolate_env_vars(content)?;
    let config: GatewayConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;
    finish(config, origin)
}

/// Parse JSON text; `origin` only labels errors
pub fn parse_json(content: &str, origin: &str) -> ConfigResult<GatewayConfig> {
    let interpolated = interpolate_env_vars(content)?;
    let config: GatewayConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;
    finish(config, origin)
}

fn read(path: &Path) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

fn finish(config: GatewayConfig, origin: &str) -> ConfigResult<GatewayConfig> {
    ConfigValidator::new().validate(&config)?;
    debug!(
        origin,
        providers = config.providers.len(),
        models = config.models.len(),
        "loaded gateway configuration"
    );
    Ok(config)
}
