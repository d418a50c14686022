//! Secret handling
//!
//! Resolved credentials are wrapped in [`SecretString`] from the moment they
//! leave the credential store. The wrapper redacts itself in `Debug` and
//! `Display` output and cannot be serialized, so a secret can only reach a
//! log line or a persisted document through an explicit `expose_secret`.

use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// A credential value that never prints itself
#[derive(Clone)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Get the actual value. Only header and URL construction should call this.
    pub fn expose_secret(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Partially redacted form for diagnostics
    pub fn partial_redact(&self) -> String {
        let len = self.value.chars().count();
        if len == 0 {
            return "[EMPTY]".to_string();
        }
        if len <= 8 {
            return REDACTED.to_string();
        }

        let head: String = self.value.chars().take(3).collect();
        let tail: String = self.value.chars().skip(len - 4).collect();
        format!("{head}...{tail}")
    }

    /// Replace every occurrence of the secret inside `text`.
    ///
    /// Transport errors and upstream error bodies sometimes echo the request
    /// URL, which carries the key for query-parameter auth.
    pub fn scrub(&self, text: &str) -> String {
        if self.value.is_empty() {
            return text.to_string();
        }
        text.replace(&self.value, REDACTED)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
