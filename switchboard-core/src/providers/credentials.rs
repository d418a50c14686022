//! Call-time credential resolution
//!
//! Provider configs carry a credential *reference*. The secret is looked up
//! for every attempt and dropped once the request headers are built, so the
//! core never holds or persists keys beyond a single call.

use crate::config::SecretString;
use std::collections::HashMap;
use std::env;

/// Resolves a credential reference to its secret value
pub trait CredentialStore: Send + Sync {
    fn resolve(&self, reference: &str) -> Option<SecretString>;
}

/// Treats the reference as an environment variable name
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialStore;

impl CredentialStore for EnvCredentialStore {
    fn resolve(&self, reference: &str) -> Option<SecretString> {
        env::var(reference)
            .ok()
            .filter(|value| !value.is_empty())
            .map(SecretString::new)
    }
}

/// Fixed reference → secret table
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    secrets: HashMap<String, SecretString>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, reference: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets
            .insert(reference.into(), SecretString::new(secret.into()));
        self
    }
}

impl CredentialStore for StaticCredentialStore {
    fn resolve(&self, reference: &str) -> Option<SecretString> {
        self.secrets.get(reference).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_store() {
        env::set_var("SWB_CREDENTIAL_TEST", "sk-test");
        env::set_var("SWB_CREDENTIAL_EMPTY", "");

        let store = EnvCredentialStore;
        assert_eq!(
            store.resolve("SWB_CREDENTIAL_TEST").unwrap().expose_secret(),
            "sk-test"
        );
        assert!(store.resolve("SWB_CREDENTIAL_EMPTY").is_none());
        assert!(store.resolve("SWB_CREDENTIAL_UNSET").is_none());

        env::remove_var("SWB_CREDENTIAL_TEST");
        env::remove_var("SWB_CREDENTIAL_EMPTY");
    }

    #[test]
    fn test_static_store() {
        let store = StaticCredentialStore::new().with_secret("moonshot", "sk-moon");
        assert_eq!(store.resolve("moonshot").unwrap().expose_secret(), "sk-moon");
        assert!(store.resolve("other").is_none());
    }
}
