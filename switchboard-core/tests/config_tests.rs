//! Integration tests for configuration loading and validation

use std::fs;
use std::path::PathBuf;
use switchboard_core::config::{
    load_from_json, load_from_yaml, AuthScheme, ConfigError, ProviderKind, ValidationErrorKind,
};
use switchboard_core::protocol::UsageAccumulation;
use switchboard_core::providers::{FailureClass, ProviderRegistry};
use tempfile::TempDir;

/// Helper to create a test config file
fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_valid_yaml_config() {
    std::env::set_var("SWB_CFG_MOONSHOT_URL", "https://api.moonshot.ai/v1");

    let yaml = r#"
version: "0.1"
providers:
  - name: moonshot
    kind: openai_compatible
    base_url: ${SWB_CFG_MOONSHOT_URL}
    credential: MOONSHOT_API_KEY
    max_context_tokens: 262144
    timeouts:
      connect_ms: 5000
      first_byte_ms: 30000
    error_patterns:
      - pattern: "exceeded model token limit"
        classification: context_limit_exceeded
  - name: hosted
    kind: managed
    base_url: https://gateway.example.com/v1
    credential: HOSTED_KEY
    auth:
      type: header
      name: x-gateway-key
    usage_accumulation: replace
models:
  - name: kimi-for-coding
    provider: moonshot
    upstream_model: kimi-k2-0905-preview
  - name: hosted-chat
    provider: hosted
retry:
  max_attempts: 5
  initial_delay_ms: 250
repair:
  max_attempts_per_window: 20
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", yaml);

    let config = load_from_yaml(path).unwrap();
    assert_eq!(config.version, "0.1");
    assert_eq!(config.providers.len(), 2);

    let moonshot = &config.providers[0];
    assert_eq!(moonshot.base_url, "https://api.moonshot.ai/v1");
    assert_eq!(moonshot.kind, ProviderKind::OpenaiCompatible);
    assert_eq!(moonshot.timeouts.connect_ms, 5_000);
    assert_eq!(moonshot.timeouts.read_ms, 60_000);
    assert_eq!(
        moonshot.error_patterns[0].classification,
        FailureClass::ContextLimitExceeded
    );

    let hosted = &config.providers[1];
    assert_eq!(
        hosted.auth_scheme(),
        AuthScheme::Header {
            name: "x-gateway-key".into()
        }
    );
    assert_eq!(hosted.usage_mode(), UsageAccumulation::Replace);

    assert_eq!(config.models[0].upstream_name(), "kimi-k2-0905-preview");
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.repair.max_attempts_per_window, 20);
    assert_eq!(config.repair.window_ms, 60_000);

    std::env::remove_var("SWB_CFG_MOONSHOT_URL");
}

#[test]
fn test_load_valid_json_config() {
    let json = r#"{
        "version": "0.1",
        "providers": [{
            "name": "google",
            "kind": "gemini",
            "base_url": "https://generativelanguage.googleapis.com/v1beta",
            "credential": "GEMINI_API_KEY"
        }],
        "models": [{"name": "gemini-flash", "provider": "google", "upstream_model": "gemini-2.5-flash"}]
    }"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.json", json);

    let config = load_from_json(path).unwrap();
    let google = &config.providers[0];
    assert_eq!(
        google.auth_scheme(),
        AuthScheme::QueryParam { name: "key".into() }
    );
    assert_eq!(google.usage_mode(), UsageAccumulation::Replace);

    let registry = ProviderRegistry::from_config(&config);
    assert_eq!(registry.model_names(), vec!["gemini-flash"]);
}

#[test]
fn test_managed_defaults_to_additive_usage() {
    let yaml = r#"
version: "0.1"
providers:
  - name: hosted
    kind: managed
    base_url: https://gateway.example.com/v1
    credential: HOSTED_KEY
"#;
    let dir = TempDir::new().unwrap();
    let config = load_from_yaml(create_test_file(&dir, "c.yaml", yaml)).unwrap();

    assert_eq!(config.providers[0].usage_mode(), UsageAccumulation::Add);
    assert_eq!(
        config.providers[0].auth_scheme(),
        AuthScheme::Header {
            name: "x-api-key".into()
        }
    );
}

#[test]
fn test_missing_env_var_fails_load() {
    let yaml = r#"
version: "0.1"
providers:
  - name: openai
    kind: openai_compatible
    base_url: ${SWB_CFG_DEFINITELY_UNSET}
    credential: OPENAI_API_KEY
"#;
    let dir = TempDir::new().unwrap();
    let err = load_from_yaml(create_test_file(&dir, "c.yaml", yaml)).unwrap_err();

    match err {
        ConfigError::EnvVarNotFound { var } => assert_eq!(var, "SWB_CFG_DEFINITELY_UNSET"),
        other => panic!("expected EnvVarNotFound, got {other:?}"),
    }
}

#[test]
fn test_unknown_field_rejected() {
    let yaml = r#"
version: "0.1"
providers:
  - name: openai
    kind: openai_compatible
    base_url: https://api.openai.com/v1
    credential: OPENAI_API_KEY
    api_key: sk-should-not-be-here
"#;
    let dir = TempDir::new().unwrap();
    let err = load_from_yaml(create_test_file(&dir, "c.yaml", yaml)).unwrap_err();

    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_unsupported_version() {
    let yaml = r#"
version: "2.0"
providers:
  - name: openai
    kind: openai_compatible
    base_url: https://api.openai.com/v1
    credential: OPENAI_API_KEY
"#;
    let dir = TempDir::new().unwrap();
    let err = load_from_yaml(create_test_file(&dir, "c.yaml", yaml)).unwrap_err();

    match err {
        ConfigError::Validation(e) => {
            assert_eq!(e.field_path, "version");
            assert!(matches!(e.kind, ValidationErrorKind::InvalidVersion { .. }));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_model_referencing_unknown_provider() {
    let yaml = r#"
version: "0.1"
providers:
  - name: openai
    kind: openai_compatible
    base_url: https://api.openai.com/v1
    credential: OPENAI_API_KEY
models:
  - name: gemini-pro
    provider: google
"#;
    let dir = TempDir::new().unwrap();
    let err = load_from_yaml(create_test_file(&dir, "c.yaml", yaml)).unwrap_err();

    match err {
        ConfigError::Validation(e) => assert_eq!(e.field_path, "models[0].provider"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_bad_base_url_scheme() {
    let yaml = r#"
version: "0.1"
providers:
  - name: openai
    kind: openai_compatible
    base_url: ftp://api.openai.com/v1
    credential: OPENAI_API_KEY
"#;
    let dir = TempDir::new().unwrap();
    let err = load_from_yaml(create_test_file(&dir, "c.yaml", yaml)).unwrap_err();

    match err {
        ConfigError::Validation(e) => {
            assert_eq!(e.field_path, "providers[0].base_url");
            assert!(matches!(e.kind, ValidationErrorKind::InvalidUrl { .. }));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_zero_timeout_rejected() {
    let yaml = r#"
version: "0.1"
providers:
  - name: openai
    kind: openai_compatible
    base_url: https://api.openai.com/v1
    credential: OPENAI_API_KEY
    timeouts:
      read_ms: 0
"#;
    let dir = TempDir::new().unwrap();
    let err = load_from_yaml(create_test_file(&dir, "c.yaml", yaml)).unwrap_err();

    match err {
        ConfigError::Validation(e) => assert_eq!(e.field_path, "providers[0].timeouts.read_ms"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_missing_file() {
    let err = load_from_yaml("/nonexistent/switchboard/gateway.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
